//! ブートセクタ書き込みツール
//!
//! 使用方法: bootpatch <image.dsk>...
//!
//! 各イメージの先頭512バイトを Boot Direct 用ローダーで上書きする

use tbkit::disk::{boot_sector, inject_boot_sector, BOOT_STUB};

fn main() {
    let images: Vec<String> = std::env::args().skip(1).collect();
    if images.is_empty() {
        eprintln!("Usage: bootpatch <image.dsk>...");
        std::process::exit(2);
    }

    print!("Stub: ");
    for b in BOOT_STUB.iter() {
        print!("{:02X} ", b);
    }
    println!("(+{} x E5)", boot_sector().len() - BOOT_STUB.len());

    let mut failed = 0;
    for image in &images {
        match inject_boot_sector(image) {
            Ok(()) => println!("  OK   {}", image),
            Err(e) => {
                println!("  FAIL {} ({})", image, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
}

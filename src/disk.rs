//! Tatung Einstein ディスクイメージ操作
//!
//! DSKの中身（フォーマット）は z88dk-appmake の管轄。ここで扱うのは
//! 先頭512バイトのブートセクタだけ。
//! Boot Direct モード: ブートセクタにローダーを書き込み、DOS80を経由せず
//! .COM を直接起動させる

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

/// ブートセクタのサイズ
pub const BOOT_SECTOR_SIZE: usize = 512;

/// 未使用領域のフィルバイト（CP/Mの未フォーマット値）
pub const BOOT_PAD: u8 = 0xE5;

/// ブートローダースタブ（Z80）
///
/// ```text
/// 21 00 01    LD   HL,0100h
/// 11 00 04    LD   DE,0400h
/// CD 20 00    CALL 0020h
/// ED B0       LDIR
/// C3 00 01    JP   0100h
/// ```
/// CALL 0020h の中身はファームウェア側の取り決め
pub const BOOT_STUB: [u8; 14] = [
    0x21, 0x00, 0x01,
    0x11, 0x00, 0x04,
    0xCD, 0x20, 0x00,
    0xED, 0xB0,
    0xC3, 0x00, 0x01,
];

/// スタブ + 0xE5パディングの512バイトセクタを生成
pub fn boot_sector() -> [u8; BOOT_SECTOR_SIZE] {
    let mut sector = [BOOT_PAD; BOOT_SECTOR_SIZE];
    sector[..BOOT_STUB.len()].copy_from_slice(&BOOT_STUB);
    sector
}

/// ディスクイメージの先頭512バイトをブートセクタで上書き
///
/// 切り詰めずに read+write で開き、オフセット0に書き込む。
/// 既存の内容は読まない。512バイト以降は変更しない（冪等）。
/// ファイルが存在しない場合はエラー。
pub fn inject_boot_sector<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    let path = path.as_ref();
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&boot_sector())?;
    file.flush()?;
    log::info!("Injected boot sector into {}", path.display());
    Ok(())
}

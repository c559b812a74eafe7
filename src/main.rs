//! tbkit - TatungBytes Toolkit
//!
//! Z80 .asm → CP/M .COM → Tatung Einstein .DSK、そして MAME で起動。
//!
//! # 使用方法
//! ```text
//! tbkit build hello.asm
//! tbkit run hello.asm --boot-direct
//! tbkit go hello.asm
//! tbkit patch build/HELLO.DSK
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use tbkit::build_log::app_title;
use tbkit::config::Config;
use tbkit::disk::inject_boot_sector;
use tbkit::emulator;
use tbkit::job::{JobKind, JobOutcome, JobRunner};
use tbkit::project::ProjectPaths;
use tbkit::toolchain;

/// tbkit - TatungBytes Toolkit
#[derive(Parser, Debug)]
#[command(name = "tbkit")]
#[command(author = "TatungBytes")]
#[command(version)]
#[command(about = "Z80 .asm -> CP/M .COM -> Tatung Einstein .DSK, plus run in MAME", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Cmd,

    /// 設定ファイル（JSON）
    #[arg(long, global = true)]
    config: Option<String>,

    /// ホームディレクトリ（相対パスの基準）
    #[arg(long, global = true)]
    home: Option<String>,

    /// 作業ディレクトリ（.COM / .DSK の出力先）
    #[arg(short, long, global = true)]
    workdir: Option<String>,

    /// z80asm のパス
    #[arg(long, global = true)]
    z80asm: Option<String>,

    /// z88dk-appmake のパス
    #[arg(long, global = true)]
    appmake: Option<String>,

    /// CP/Mディスクフォーマット
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// MAME のパス
    #[arg(long, global = true)]
    mame: Option<String>,

    /// システムディスク（DOS80.DSK）
    #[arg(long, global = true)]
    system_disk: Option<String>,

    /// MAME の ROM ディレクトリ
    #[arg(long, global = true)]
    rompath: Option<String>,

    /// ブートローダーを書き込んでDOS80なしで起動
    #[arg(long, global = true)]
    boot_direct: bool,

    /// フルスクリーンで起動（-nowindow）
    #[arg(long, global = true)]
    nowindow: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// .asm をアセンブルして .COM と .DSK を作る
    Build {
        /// Z80 ソースファイル
        source: PathBuf,
    },
    /// ビルド済み .DSK を MAME で起動
    Run {
        /// Z80 ソースファイル（成果物名の決定に使う）
        source: PathBuf,
    },
    /// ビルドして成功したら起動
    Go {
        source: PathBuf,
    },
    /// ディスクイメージにブートセクタを書き込む
    Patch {
        /// 対象の .DSK
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// 有効な設定を表示
    Config {
        /// 設定ファイルに保存する
        #[arg(long)]
        save: bool,
    },
}

/// コマンドライン指定で設定を上書き
fn apply_overrides(config: &mut Config, args: &Args) {
    let overrides = [
        (&args.workdir, &mut config.workdir),
        (&args.z80asm, &mut config.z80asm),
        (&args.appmake, &mut config.appmake),
        (&args.format, &mut config.cpmdisk_format),
        (&args.mame, &mut config.mame),
        (&args.system_disk, &mut config.system_disk),
        (&args.rompath, &mut config.rompath),
    ];
    for (value, field) in overrides {
        if let Some(v) = value {
            *field = v.clone();
        }
    }
    if args.boot_direct {
        config.boot_direct = true;
    }
    if args.nowindow {
        config.windowed = false;
    }
}

/// ジョブを起動し、ステータスを表示しながら終了を待つ
fn run_job<F>(runner: &JobRunner, kind: JobKind, task: F) -> JobOutcome
where
    F: FnOnce(&tbkit::job::JobContext) -> tbkit::error::Result<String> + Send + 'static,
{
    match runner.spawn(kind, task) {
        Ok(handle) => handle.wait_with(|status| println!("{}", status)),
        Err(e) => {
            let message = kind.failure_message(&e);
            eprintln!("{}", message);
            JobOutcome { kind, success: false, message }
        }
    }
}

fn build_job(runner: &JobRunner, config: &Config, source: &Path) -> JobOutcome {
    let config = config.clone();
    let paths = ProjectPaths::new(&config, source);
    println!("Selected project: {}.ASM", paths.base);
    run_job(runner, JobKind::Build, move |ctx| {
        let dsk = toolchain::build(&config, &paths, ctx)?;
        let name = dsk.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(format!("Build OK → {}", name))
    })
}

fn run_emulator_job(runner: &JobRunner, config: &Config, source: &Path) -> JobOutcome {
    let config = config.clone();
    let paths = ProjectPaths::new(&config, source);
    run_job(runner, JobKind::Run, move |ctx| emulator::run(&config, &paths, ctx))
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    let (mut config, config_path) = Config::load_with_options(args.config.as_deref(), args.home.as_deref());
    apply_overrides(&mut config, &args);
    log::debug!("{} (config: {})", app_title(), config_path.display());

    let runner = JobRunner::new();
    let success = match &args.command {
        Cmd::Build { source } => build_job(&runner, &config, source).success,
        Cmd::Run { source } => run_emulator_job(&runner, &config, source).success,
        Cmd::Go { source } => {
            build_job(&runner, &config, source).success
                && run_emulator_job(&runner, &config, source).success
        }
        Cmd::Patch { images } => {
            let mut ok = true;
            for image in images {
                match inject_boot_sector(image) {
                    Ok(()) => println!("Patched {}", image.display()),
                    Err(e) => {
                        eprintln!("Failed to patch {}: {}", image.display(), e);
                        ok = false;
                    }
                }
            }
            ok
        }
        Cmd::Config { save } => match serde_json::to_string_pretty(&config) {
            Ok(json) => {
                println!("{}", json);
                if *save {
                    match config.save_to(&config_path) {
                        Ok(()) => {
                            eprintln!("Saved {}", config_path.display());
                            true
                        }
                        Err(e) => {
                            eprintln!("{}", e);
                            false
                        }
                    }
                } else {
                    true
                }
            }
            Err(e) => {
                eprintln!("Failed to serialize config: {}", e);
                false
            }
        },
    };

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

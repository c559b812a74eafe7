//! MAME 起動
//!
//! 通常モード: DOS80 を flop1、ビルドしたDSKを flop2 に入れて起動。
//! Boot Direct モード: DSKにブートセクタを書き込み、flop1 単独で起動。

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::{Config, EmulatorFlags};
use crate::disk::inject_boot_sector;
use crate::error::{Result, ToolError};
use crate::job::JobContext;
use crate::project::ProjectPaths;

/// MAME の引数を組み立てる
///
/// `floppies` は1枚目が `-flop1`、2枚目が `-flop2`。
pub fn emulator_args(
    flags: EmulatorFlags,
    rompath: &Path,
    machine: &str,
    floppies: &[PathBuf],
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let window = if flags.contains(EmulatorFlags::WINDOWED) { "-window" } else { "-nowindow" };
    args.push(window.into());
    if flags.contains(EmulatorFlags::VIDEO_SOFT) {
        args.push("-video".into());
        args.push("soft".into());
    }
    if flags.contains(EmulatorFlags::UI_ACTIVE) {
        args.push("-ui_active".into());
    }
    if flags.contains(EmulatorFlags::SKIP_INTRO) {
        args.push("-skip_gameinfo".into());
    }
    args.push("-rompath".into());
    args.push(rompath.into());
    args.push(machine.into());
    for (i, disk) in floppies.iter().take(2).enumerate() {
        args.push(format!("-flop{}", i + 1).into());
        args.push(disk.into());
    }
    args
}

/// `XDG_RUNTIME_DIR` の代わりを作る場所
const RUNTIME_TMP_ROOT: &str = "/tmp";

/// 現在のユーザーID
///
/// `/proc/self` の所有者を見るので Linux 限定。他のOSでは `None` になり、
/// `/run/user/<uid>` は探さずに `/tmp` 側を使う。
#[cfg(target_os = "linux")]
fn current_uid() -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    fs::metadata("/proc/self").ok().map(|m| m.uid())
}

#[cfg(not(target_os = "linux"))]
fn current_uid() -> Option<u32> {
    None
}

/// XDG_RUNTIME_DIR が未設定（または空）のときに使うディレクトリ
///
/// `/run/user/<uid>` があればそれ、無ければ `/tmp/runtime-<USER>` を 0700 で作る。
/// 設定済みなら `None`（環境はそのまま）。
pub fn runtime_dir_for(current: Option<OsString>, user: Option<String>) -> std::io::Result<Option<PathBuf>> {
    runtime_dir_with_uid(current, user, current_uid())
}

fn runtime_dir_with_uid(
    current: Option<OsString>,
    user: Option<String>,
    uid: Option<u32>,
) -> std::io::Result<Option<PathBuf>> {
    if current.map(|v| !v.is_empty()).unwrap_or(false) {
        return Ok(None);
    }
    if let Some(uid) = uid {
        let candidate = PathBuf::from(format!("/run/user/{}", uid));
        if candidate.is_dir() {
            return Ok(Some(candidate));
        }
    }
    // TMPDIR には従わない
    let tmp = Path::new(RUNTIME_TMP_ROOT)
        .join(format!("runtime-{}", user.unwrap_or_else(|| "user".to_string())));
    create_private_dir(&tmp)?;
    Ok(Some(tmp))
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if dir.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

/// ビルド済みDSKでMAMEを起動し、終了まで待つ
///
/// MAME自体の終了コードはエラーにしない（メッセージで報告）。
pub fn run(config: &Config, paths: &ProjectPaths, ctx: &JobContext) -> Result<String> {
    if !paths.dsk.is_file() {
        return Err(ToolError::MissingArtifact(paths.dsk.clone()));
    }

    let floppies = if config.boot_direct {
        ctx.status("Injecting bootloader…");
        inject_boot_sector(&paths.dsk)?;
        vec![paths.dsk.clone()]
    } else {
        vec![config.system_disk_path(), paths.dsk.clone()]
    };
    ctx.checkpoint()?;

    let mame = config.resolve_tool(&config.mame);
    let args = emulator_args(
        config.emulator_flags(),
        &config.rompath_path(),
        &config.machine,
        &floppies,
    );

    let mut cmd = Command::new(&mame);
    cmd.args(&args).current_dir(&paths.workdir);
    let runtime_dir = runtime_dir_for(
        std::env::var_os("XDG_RUNTIME_DIR"),
        std::env::var("USER").ok(),
    )?;
    if let Some(dir) = runtime_dir {
        log::debug!("XDG_RUNTIME_DIR={}", dir.display());
        cmd.env("XDG_RUNTIME_DIR", dir);
    }

    ctx.status(format!("Running {}…", mame.display()));
    log::info!("$ {} {:?}", mame.display(), args);
    let status = cmd.status()?;
    if status.success() {
        Ok("MAME exited normally.".to_string())
    } else {
        Ok(match status.code() {
            Some(code) => format!("MAME exited with status {}.", code),
            None => "MAME terminated by a signal.".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::boot_sector;
    use crate::job::JobKind;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_args_with_system_disk() {
        let args = emulator_args(
            EmulatorFlags::all(),
            Path::new("/roms"),
            "einstein",
            &[PathBuf::from("/d/DOS80.DSK"), PathBuf::from("/w/HELLO.DSK")],
        );
        assert_eq!(
            strings(&args),
            vec![
                "-window", "-video", "soft", "-ui_active", "-skip_gameinfo",
                "-rompath", "/roms", "einstein",
                "-flop1", "/d/DOS80.DSK", "-flop2", "/w/HELLO.DSK",
            ]
        );
    }

    #[test]
    fn test_args_boot_direct_minimal_flags() {
        let args = emulator_args(
            EmulatorFlags::empty(),
            Path::new("roms"),
            "einstein",
            &[PathBuf::from("HELLO.DSK")],
        );
        assert_eq!(
            strings(&args),
            vec!["-nowindow", "-rompath", "roms", "einstein", "-flop1", "HELLO.DSK"]
        );
    }

    #[test]
    fn test_runtime_dir_already_set() {
        let dir = runtime_dir_for(Some(OsString::from("/run/user/1000")), None).unwrap();
        assert!(dir.is_none());
    }

    #[test]
    fn test_runtime_dir_fallback() {
        let dir = runtime_dir_for(Some(OsString::new()), Some("tbkit-test".to_string()))
            .unwrap()
            .unwrap();
        assert!(dir.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_runtime_dir_fallback_ignores_tmpdir() {
        use std::os::unix::fs::PermissionsExt;

        // uid が分からなければ必ず /tmp 側
        let user = format!("tbkit-fallback-{}", std::process::id());
        let dir = runtime_dir_with_uid(None, Some(user.clone()), None).unwrap().unwrap();
        assert_eq!(dir, PathBuf::from("/tmp").join(format!("runtime-{}", user)));
        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
        fs::remove_dir(&dir).unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_current_uid_on_linux() {
        assert!(current_uid().is_some());
    }

    #[test]
    fn test_run_without_dsk() {
        let root = tempfile::tempdir().unwrap();
        let config = Config { home: root.path().to_string_lossy().into_owned(), ..Config::default() };
        let paths = ProjectPaths::new(&config, Path::new("hello.asm"));
        let err = run(&config, &paths, &JobContext::detached(JobKind::Run)).unwrap_err();
        assert!(matches!(err, ToolError::MissingArtifact(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_boot_direct_patches_and_launches() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let mame = root.path().join("fake-mame");
        // 引数をファイルに書き出すだけ
        fs::write(&mame, "#!/bin/sh\nfor a in \"$@\"; do echo \"$a\"; done > args.txt\n").unwrap();
        fs::set_permissions(&mame, fs::Permissions::from_mode(0o755)).unwrap();

        let config = Config {
            home: root.path().to_string_lossy().into_owned(),
            mame: mame.to_string_lossy().into_owned(),
            boot_direct: true,
            ..Config::default()
        };
        let paths = ProjectPaths::new(&config, Path::new("hello.asm"));
        fs::create_dir_all(&paths.workdir).unwrap();
        fs::write(&paths.dsk, vec![0u8; 1024]).unwrap();

        let msg = run(&config, &paths, &JobContext::detached(JobKind::Run)).unwrap();
        assert_eq!(msg, "MAME exited normally.");

        let image = fs::read(&paths.dsk).unwrap();
        assert_eq!(&image[..512], &boot_sector()[..]);
        assert!(image[512..].iter().all(|&b| b == 0));

        let args = fs::read_to_string(paths.workdir.join("args.txt")).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(&args[args.len() - 3..], &["einstein", "-flop1", paths.dsk.to_str().unwrap()]);
        assert!(!args.contains(&"-flop2"));
    }
}

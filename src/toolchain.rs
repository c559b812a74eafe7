//! ビルドパイプライン（z88dk）
//!
//! `.asm` → z80asm → `.COM`（名前を正規化）→ z88dk-appmake +cpmdisk → `.DSK`
//!
//! 各ステップは順番に実行し、外部ツールの終了を待つ。
//! 失敗しても途中の成果物は残す（ロールバックしない）。

use std::fs;
use std::path::PathBuf;

use crate::build_log::BuildLog;
use crate::config::Config;
use crate::error::{Result, ToolError};
use crate::job::JobContext;
use crate::normalize::{normalize, remove_com_variants, remove_if_present};
use crate::project::ProjectPaths;

/// z80asm の引数: `-v -b <source> -o<BASE.COM>`
pub fn assembler_args(source: &str, com_name: &str) -> Vec<String> {
    vec![
        "-v".to_string(),
        "-b".to_string(),
        source.to_string(),
        format!("-o{}", com_name),
    ]
}

/// z88dk-appmake の引数: `+cpmdisk -f <format> -b <BASE.COM> -o <BASE.DSK>`
pub fn packer_args(format: &str, com_name: &str, dsk_name: &str) -> Vec<String> {
    vec![
        "+cpmdisk".to_string(),
        "-f".to_string(),
        format.to_string(),
        "-b".to_string(),
        com_name.to_string(),
        "-o".to_string(),
        dsk_name.to_string(),
    ]
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// ソースをアセンブルしてディスクイメージを作る
///
/// 成功時は `.DSK` のパスを返す。
pub fn build(config: &Config, paths: &ProjectPaths, ctx: &JobContext) -> Result<PathBuf> {
    ctx.status("Building…");
    if !paths.source.is_file() {
        return Err(ToolError::MissingInput(paths.source.clone()));
    }
    // アセンブラは作業ディレクトリで動くので絶対パスにしておく
    let source = fs::canonicalize(&paths.source)?;
    let source_dir = source
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| paths.source_dir());

    let log = BuildLog::open(&paths.log)?;
    log.line(&format!("Building {}", source.display()))?;
    log.line(&format!("Origin: {} (info)", config.origin))?;
    fs::create_dir_all(&paths.workdir)?;

    remove_com_variants(&paths.workdir, &paths.base)?;
    ctx.checkpoint()?;

    // アセンブル
    ctx.status(format!("Assembling {}…", file_name(&source)));
    let com_name = file_name(&paths.com);
    let z80asm = config.resolve_tool(&config.z80asm);
    log.stream_proc(&z80asm, &assembler_args(&source.to_string_lossy(), &com_name), &paths.workdir)?;

    let final_com = normalize(&paths.workdir, &source_dir, &paths.base)?;
    if !final_com.is_file() {
        log.line(&format!("! {} not produced", com_name))?;
        return Err(ToolError::MissingArtifact(final_com));
    }
    ctx.checkpoint()?;

    // DSK作成
    let dsk_name = file_name(&paths.dsk);
    ctx.status(format!("Packing {}…", dsk_name));
    // 前回のDSKが残っていると未生成を検出できない
    remove_if_present(&paths.dsk)?;
    let appmake = config.resolve_tool(&config.appmake);
    log.stream_proc(
        &appmake,
        &packer_args(config.disk_format(), &file_name(&final_com), &dsk_name),
        &paths.workdir,
    )?;
    if !paths.dsk.is_file() {
        log.line(&format!("! {} not produced", dsk_name))?;
        return Err(ToolError::MissingArtifact(paths.dsk.clone()));
    }

    log.line(&format!("Build OK: {}", paths.dsk.display()))?;
    Ok(paths.dsk.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;

    #[test]
    fn test_assembler_args() {
        assert_eq!(
            assembler_args("/src/hello.asm", "HELLO.COM"),
            vec!["-v", "-b", "/src/hello.asm", "-oHELLO.COM"]
        );
    }

    #[test]
    fn test_packer_args() {
        assert_eq!(
            packer_args("einstein", "HELLO.COM", "HELLO.DSK"),
            vec!["+cpmdisk", "-f", "einstein", "-b", "HELLO.COM", "-o", "HELLO.DSK"]
        );
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            home: dir.path().to_string_lossy().into_owned(),
            ..Config::default()
        };
        let paths = ProjectPaths::new(&config, &dir.path().join("absent.asm"));
        let err = build(&config, &paths, &JobContext::detached(JobKind::Build)).unwrap_err();
        assert!(matches!(err, ToolError::MissingInput(_)));
    }

    #[cfg(unix)]
    mod fake_tools {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        /// ソース隣に小文字の .com を出す z80asm と、.COM を .DSK に詰める appmake
        fn setup(asm_body: &str) -> (tempfile::TempDir, Config, ProjectPaths) {
            let root = tempfile::tempdir().unwrap();
            let tools = root.path().join("tools");
            let src = root.path().join("src");
            fs::create_dir_all(&tools).unwrap();
            fs::create_dir_all(&src).unwrap();
            fs::write(src.join("hello.asm"), "org 256\nret\n").unwrap();

            let z80asm = script(&tools, "z80asm", asm_body);
            // $5 = .COM, $7 = .DSK
            let appmake = script(&tools, "appmake", "cat \"$5\" > \"$7\"");

            let config = Config {
                home: root.path().to_string_lossy().into_owned(),
                z80asm: z80asm.to_string_lossy().into_owned(),
                appmake: appmake.to_string_lossy().into_owned(),
                ..Config::default()
            };
            let paths = ProjectPaths::new(&config, &src.join("hello.asm"));
            (root, config, paths)
        }

        #[test]
        fn test_build_normalizes_and_packs() {
            // 引数3 = ソースパス。ソースの隣に小文字で出力
            let (_root, config, paths) = setup("printf 'COMDATA' > \"$(dirname \"$3\")/hello.com\"");
            fs::create_dir_all(&paths.workdir).unwrap();
            fs::write(paths.workdir.join("Hello.Com"), b"stale").unwrap();

            let dsk = build(&config, &paths, &JobContext::detached(JobKind::Build)).unwrap();

            assert_eq!(dsk, paths.dsk);
            assert_eq!(fs::read(&paths.com).unwrap(), b"COMDATA");
            assert_eq!(fs::read(&paths.dsk).unwrap(), b"COMDATA");
            assert!(!paths.source_dir().join("hello.com").exists());
            assert!(!paths.workdir.join("Hello.Com").exists());
            let log = fs::read_to_string(&paths.log).unwrap();
            assert!(log.contains("Building "));
            assert!(log.contains("+cpmdisk -f einstein -b HELLO.COM -o HELLO.DSK"));
        }

        #[test]
        fn test_build_assembler_failure() {
            let (_root, config, paths) = setup("echo 'error: syntax' >&2; exit 1");
            let err = build(&config, &paths, &JobContext::detached(JobKind::Build)).unwrap_err();
            match err {
                ToolError::ExternalTool { code, .. } => assert_eq!(code, Some(1)),
                other => panic!("unexpected error: {:?}", other),
            }
            let log = fs::read_to_string(&paths.log).unwrap();
            assert!(log.contains("error: syntax"));
        }

        #[test]
        fn test_build_stale_dsk_is_not_accepted() {
            let (root, mut config, paths) = setup("printf 'NEW' > \"$(dirname \"$3\")/hello.com\"");
            // 何も書かずに成功する appmake
            config.appmake = script(&root.path().join("tools"), "appmake-noop", "exit 0")
                .to_string_lossy()
                .into_owned();
            fs::create_dir_all(&paths.workdir).unwrap();
            fs::write(&paths.dsk, b"STALE").unwrap();

            let err = build(&config, &paths, &JobContext::detached(JobKind::Build)).unwrap_err();
            match err {
                ToolError::MissingArtifact(p) => assert_eq!(p, paths.dsk),
                other => panic!("unexpected error: {:?}", other),
            }
            assert!(!paths.dsk.exists());
        }

        #[test]
        fn test_build_missing_com() {
            let (_root, config, paths) = setup("exit 0");
            let err = build(&config, &paths, &JobContext::detached(JobKind::Build)).unwrap_err();
            match err {
                ToolError::MissingArtifact(p) => assert_eq!(p, paths.com),
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }
}

//! プロジェクトの成果物パス
//!
//! ソース `hello.asm` に対して BASE = `HELLO`:
//! `HELLO.COM`, `HELLO.DSK`, `HELLO.o` は作業ディレクトリ、
//! `HELLO_build.log` はログディレクトリに置く

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::normalize::com_file_name;

/// ソースファイル名から BASE（大文字の拡張子なし名）を取得
pub fn base_name(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().to_uppercase())
        .unwrap_or_default()
}

/// 1プロジェクト分の入出力パス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub source: PathBuf,
    pub workdir: PathBuf,
    pub base: String,
    pub com: PathBuf,
    pub dsk: PathBuf,
    pub obj: PathBuf,
    pub log: PathBuf,
}

impl ProjectPaths {
    pub fn new(config: &Config, source: &Path) -> Self {
        let workdir = config.workdir_path();
        let base = base_name(source);
        ProjectPaths {
            source: source.to_path_buf(),
            com: workdir.join(com_file_name(&base)),
            dsk: workdir.join(format!("{}.DSK", base)),
            obj: workdir.join(format!("{}.o", base)),
            log: config.log_dir_path().join(format!("{}_build.log", base)),
            workdir,
            base,
        }
    }

    /// ソースファイルのあるディレクトリ（相対パスならカレント）
    pub fn source_dir(&self) -> PathBuf {
        match self.source.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

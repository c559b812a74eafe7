//! .COM 出力ファイル名の正規化
//!
//! z80asm は出力ファイル名の大文字小文字を保証しない（`hello.com`,
//! `HELLO.COM`, ソースと同じディレクトリ等）。ビルド後に候補を集め、
//! 作業ディレクトリの `BASE.COM` ただ1つに揃える。
//!
//! - 探索（I/O）: [`discover_candidates`]
//! - 選択（純粋関数）: [`select_keeper`]
//! - 適用: [`normalize`]

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// 出力候補ファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCandidate {
    /// 見つかったディレクトリ
    pub directory: PathBuf,
    /// ディスク上の実際のファイル名（大文字小文字そのまま）
    pub name: String,
    /// 更新日時
    pub modified: SystemTime,
}

impl OutputCandidate {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }
}

/// 選択結果: 残す1つと削除するもの
#[derive(Debug)]
pub struct Selection {
    pub keeper: OutputCandidate,
    pub discard: Vec<OutputCandidate>,
}

/// 正規の.COMファイル名（`BASE.COM`）
pub fn com_file_name(base: &str) -> String {
    format!("{}.COM", base.to_uppercase())
}

/// 比較用にディレクトリを正規化（存在しなければそのまま）
fn canonical_dir(dir: &Path) -> PathBuf {
    fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

/// ディレクトリ群から `base.com`（大文字小文字無視）に一致する通常ファイルを集める
///
/// 同じディレクトリは一度だけ走査する。存在しないディレクトリは無視。
pub fn discover_candidates(dirs: &[&Path], base: &str) -> io::Result<Vec<OutputCandidate>> {
    let wanted = format!("{}.com", base.to_lowercase());
    let mut scanned: Vec<PathBuf> = Vec::new();
    let mut candidates = Vec::new();

    for dir in dirs {
        let dir = canonical_dir(dir);
        if scanned.contains(&dir) {
            continue;
        }
        scanned.push(dir.clone());

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        for entry in entries {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if name.to_lowercase() != wanted {
                continue;
            }
            // シンボリックリンクは辿る
            let meta = match fs::metadata(entry.path()) {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if !meta.is_file() {
                continue;
            }
            candidates.push(OutputCandidate {
                directory: dir.clone(),
                name,
                modified: meta.modified().unwrap_or(UNIX_EPOCH),
            });
        }
    }

    Ok(candidates)
}

/// 残すファイルを選ぶ
///
/// 1. `desired` にちょうど一致する候補があればそれ
/// 2. なければ更新日時が最も新しいもの（同時刻ならパスの辞書順で最小）
///
/// 候補が空なら `None`。
pub fn select_keeper(mut candidates: Vec<OutputCandidate>, desired: &Path) -> Option<Selection> {
    if candidates.is_empty() {
        return None;
    }

    let index = candidates
        .iter()
        .position(|c| c.path() == desired)
        .or_else(|| {
            candidates
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    a.modified
                        .cmp(&b.modified)
                        .then_with(|| b.path().cmp(&a.path()))
                })
                .map(|(i, _)| i)
        })?;

    let keeper = candidates.remove(index);
    Some(Selection { keeper, discard: candidates })
}

/// ファイルを削除。既に消えていればエラーにしない
pub(crate) fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("{} vanished before cleanup", path.display());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// リネーム。失敗したら（別ファイルシステム等）コピー＋削除
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Err(e) = fs::rename(from, to) {
        if e.kind() == ErrorKind::NotFound {
            return Err(e);
        }
        log::debug!("rename {} -> {} failed ({}), copying", from.display(), to.display(), e);
        fs::copy(from, to)?;
        remove_if_present(from)?;
    }
    Ok(())
}

/// 作業ディレクトリとソースディレクトリの `base.com` を `working_dir/BASE.COM` 1つに揃える
///
/// 戻り値は正規パス。ファイルが実際に存在するかは呼び出し側で確認すること。
/// 削除時のファイル消失は無視し、それ以外のI/Oエラーは返す。
pub fn normalize(working_dir: &Path, source_dir: &Path, base: &str) -> io::Result<PathBuf> {
    let file_name = com_file_name(base);
    let desired = working_dir.join(&file_name);
    let canonical_desired = canonical_dir(working_dir).join(&file_name);

    let candidates = discover_candidates(&[working_dir, source_dir], base)?;
    log::debug!("{} candidate(s) for {}", candidates.len(), file_name);

    if let Some(Selection { keeper, discard }) = select_keeper(candidates, &canonical_desired) {
        // 大文字小文字を区別しないFSでは foo.com と FOO.COM が同一実体になるため、先に消す
        for candidate in &discard {
            remove_if_present(&candidate.path())?;
        }
        let from = keeper.path();
        if from != canonical_desired {
            move_file(&from, &canonical_desired)?;
            log::info!("{} -> {}", from.display(), canonical_desired.display());
        }
    }

    Ok(desired)
}

/// 作業ディレクトリ内の `base.com` 系ファイル（大文字小文字問わず）を削除
///
/// 前回ビルドの残骸対策。ソースディレクトリには触れない。
pub fn remove_com_variants(folder: &Path, base: &str) -> io::Result<()> {
    let wanted = format!("{}.com", base.to_lowercase());
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let matches = entry
            .file_name()
            .to_str()
            .map(|n| n.to_lowercase() == wanted)
            .unwrap_or(false);
        if matches && entry.path().is_file() {
            remove_if_present(&entry.path())?;
        }
    }
    Ok(())
}

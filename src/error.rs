//! エラー型
//!
//! ビルド・実行ジョブで発生するエラーの分類。
//! クリーンアップ中の削除競合（ファイル消失）はここには現れない:
//! `normalize` 内部で握りつぶされる。

use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobKind;

/// ツールキットのエラー
#[derive(Error, Debug)]
pub enum ToolError {
    /// 指定されたソースファイルが存在しない
    #[error("Source not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// 外部ツールが非ゼロで終了した（シグナル終了時は code = None）
    #[error("{tool} exited with {}", describe_exit(.code))]
    ExternalTool { tool: String, code: Option<i32> },

    /// あるはずの成果物（.COM / .DSK）が無い
    #[error("{} not produced", .0.display())]
    MissingArtifact(PathBuf),

    /// 同種のジョブが実行中
    #[error("{0} already in progress")]
    Busy(JobKind),

    /// ジョブがキャンセルされた
    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "a signal".to_string(),
    }
}

/// ツールキット操作の結果型
pub type Result<T> = std::result::Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_tool_message() {
        let e = ToolError::ExternalTool { tool: "z80asm".into(), code: Some(1) };
        assert_eq!(e.to_string(), "z80asm exited with status 1");
        let e = ToolError::ExternalTool { tool: "mame".into(), code: None };
        assert_eq!(e.to_string(), "mame exited with a signal");
    }

    #[test]
    fn test_missing_artifact_message() {
        let e = ToolError::MissingArtifact(PathBuf::from("build/HELLO.COM"));
        assert_eq!(e.to_string(), "build/HELLO.COM not produced");
    }
}

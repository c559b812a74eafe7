//! バックグラウンドジョブ（ビルド / 実行）
//!
//! 外部ツールの呼び出しはブロックするので専用スレッドで動かす。
//! - 種類ごとに同時実行は1つまで（2つ目は [`ToolError::Busy`]）
//! - 進捗メッセージはチャネルで呼び出し側へ
//! - キャンセルはステップ間でのみ効く（実行中の外部プロセスは止めない）
//! - エラーはジョブ境界で短いメッセージに変換する

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{Result, ToolError};

/// ジョブの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Build,
    Run,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Build => write!(f, "Build"),
            JobKind::Run => write!(f, "Run"),
        }
    }
}

impl JobKind {
    /// エラーをステータス行用の短い文に変換
    pub fn failure_message(&self, err: &ToolError) -> String {
        let artifact = |p: &std::path::Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        };
        match (self, err) {
            (_, ToolError::MissingInput(_)) => "Error: Source .asm not found.".to_string(),
            (JobKind::Build, ToolError::MissingArtifact(p)) => {
                format!("Error: {} not produced.", artifact(p))
            }
            (JobKind::Run, ToolError::MissingArtifact(p)) => {
                format!("Error: {} missing. Build first.", artifact(p))
            }
            (_, ToolError::Cancelled) => format!("{} cancelled.", self),
            _ => format!("{} failed: {}", self, err),
        }
    }
}

/// ジョブ本体に渡すコンテキスト
pub struct JobContext {
    kind: JobKind,
    status_tx: Sender<String>,
    cancelled: Arc<AtomicBool>,
}

impl JobContext {
    /// スレッドを使わずに同期実行する場合のコンテキスト（ステータスはログのみ）
    pub fn detached(kind: JobKind) -> Self {
        let (status_tx, _) = mpsc::channel();
        JobContext { kind, status_tx, cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// ステータス行を更新
    pub fn status<S: Into<String>>(&self, msg: S) {
        let msg = msg.into();
        log::info!("[{}] {}", self.kind, msg);
        // 受信側が既にいなくても構わない
        let _ = self.status_tx.send(msg);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// ステップ間のキャンセル確認
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ToolError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// ジョブの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub kind: JobKind,
    pub success: bool,
    pub message: String,
}

/// 実行中ジョブのハンドル
pub struct JobHandle {
    kind: JobKind,
    cancelled: Arc<AtomicBool>,
    status_rx: Receiver<String>,
    thread: JoinHandle<JobOutcome>,
}

impl JobHandle {
    /// キャンセル要求（次のステップ境界で止まる）
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// 届いているステータスを1つ取り出す（無ければ None）
    pub fn try_status(&self) -> Option<String> {
        match self.status_rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// 終了まで待ち、届いたステータスを順に `on_status` へ渡す
    pub fn wait_with<F: FnMut(&str)>(self, mut on_status: F) -> JobOutcome {
        // 送信側はジョブ終了時に落ちるので、recv が Err になったら終わり
        while let Ok(msg) = self.status_rx.recv() {
            on_status(&msg);
        }
        Self::join(self.kind, self.thread)
    }

    /// 終了まで待つ
    pub fn wait(self) -> JobOutcome {
        Self::join(self.kind, self.thread)
    }

    fn join(kind: JobKind, thread: JoinHandle<JobOutcome>) -> JobOutcome {
        thread.join().unwrap_or_else(|_| JobOutcome {
            kind,
            success: false,
            message: format!("{} failed: worker panicked", kind),
        })
    }
}

/// 終了時に実行中フラグを下ろす
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// ジョブ起動管理
#[derive(Default)]
pub struct JobRunner {
    build_busy: Arc<AtomicBool>,
    run_busy: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: JobKind) -> &Arc<AtomicBool> {
        match kind {
            JobKind::Build => &self.build_busy,
            JobKind::Run => &self.run_busy,
        }
    }

    pub fn is_busy(&self, kind: JobKind) -> bool {
        self.slot(kind).load(Ordering::Acquire)
    }

    /// ジョブを起動
    ///
    /// `task` の戻り値（成功時のメッセージ）かエラーの要約が最後のステータスになる。
    pub fn spawn<F>(&self, kind: JobKind, task: F) -> Result<JobHandle>
    where
        F: FnOnce(&JobContext) -> Result<String> + Send + 'static,
    {
        let slot = Arc::clone(self.slot(kind));
        if slot
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ToolError::Busy(kind));
        }
        let guard = BusyGuard(slot);

        let (status_tx, status_rx) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let ctx = JobContext { kind, status_tx, cancelled: Arc::clone(&cancelled) };

        let thread = thread::Builder::new()
            .name(format!("tbkit-{}", kind).to_lowercase())
            .spawn(move || {
                let _guard = guard;
                let (success, message) = match task(&ctx) {
                    Ok(msg) => (true, msg),
                    Err(e) => {
                        log::error!("[{}] {}", kind, e);
                        (false, kind.failure_message(&e))
                    }
                };
                ctx.status(message.clone());
                JobOutcome { kind, success, message }
            })?;

        Ok(JobHandle { kind, cancelled, status_rx, thread })
    }
}

//! ビルドログ
//!
//! プロジェクトごとのログファイル `{BASE}_build.log` に追記する。
//! 外部ツールの標準出力・標準エラーは行単位でそのまま流し込む。
//! 同じ内容は `log` クレート（debugレベル）にも流す。

use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use crate::error::{Result, ToolError};

/// アプリ名（ログヘッダ用）
pub const APP_NAME: &str = "TatungBytes Toolkit";

/// ヘッダ行のタイトル
pub fn app_title() -> String {
    format!("{} v{}", APP_NAME, env!("CARGO_PKG_VERSION"))
}

/// ビルドログファイル
pub struct BuildLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl BuildLog {
    /// ログを開く（追記）。親ディレクトリが無ければ作成し、タイムスタンプ付きヘッダを書く
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let log = BuildLog { path, file: Mutex::new(file) };
        let stamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S");
        log.write(&format!("[{}] {}\n", stamp, app_title()))?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, text: &str) -> io::Result<()> {
        // 書き込み途中でpanicしたスレッドがあってもログは続ける
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(text.as_bytes())?;
        file.flush()
    }

    /// 1行書く（改行が無ければ付ける）
    pub fn line(&self, text: &str) -> io::Result<()> {
        log::debug!("{}", text.trim_end());
        if text.ends_with('\n') {
            self.write(text)
        } else {
            self.write(&format!("{}\n", text))
        }
    }

    /// 実行するコマンドを `$ prog arg...` 形式で記録
    pub fn cmd<S: AsRef<OsStr>>(&self, program: S, args: &[String]) -> io::Result<()> {
        let mut text = format!("$ {}", program.as_ref().to_string_lossy());
        for arg in args {
            text.push(' ');
            text.push_str(arg);
        }
        self.line(&text)
    }

    /// 外部ツールを実行し、出力をログに流す
    ///
    /// 終了を待って、非ゼロ終了なら [`ToolError::ExternalTool`]。
    pub fn stream_proc<S: AsRef<OsStr>>(&self, program: S, args: &[String], cwd: &Path) -> Result<()> {
        let program = program.as_ref();
        self.cmd(program, args)?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        // 出力の読み取りに失敗しても子プロセスは必ず回収する
        let pumped = std::thread::scope(|scope| -> io::Result<()> {
            let err_pump = scope.spawn(|| match stderr {
                Some(err) => self.pump(err),
                None => Ok(()),
            });
            let out_result = match stdout {
                Some(out) => self.pump(out),
                None => Ok(()),
            };
            let err_result = err_pump
                .join()
                .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "stderr reader panicked")));
            out_result.and(err_result)
        });

        let status = child.wait()?;
        pumped?;
        if !status.success() {
            let tool = Path::new(program)
                .file_name()
                .unwrap_or(program)
                .to_string_lossy()
                .into_owned();
            self.line(&format!("! {} failed: {}", tool, status))?;
            return Err(ToolError::ExternalTool { tool, code: status.code() });
        }
        Ok(())
    }

    fn pump<R: Read>(&self, reader: R) -> io::Result<()> {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            self.line(&String::from_utf8_lossy(&buf))?;
        }
    }
}

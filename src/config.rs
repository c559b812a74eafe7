//! 設定ファイル管理モジュール
//!
//! ツールのパスやビルド/実行オプションをJSON形式で永続化。
//! 設定ファイルが無ければ組み込みのデフォルトで動作する。

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 設定ファイルのデフォルトファイル名
const CONFIG_FILENAME: &str = "tbkit_config.json";

/// CP/Mディスクフォーマットのデフォルト
pub const DEFAULT_FORMAT: &str = "einstein";

/// 実行ファイルのディレクトリを取得
pub fn get_exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// 相対パスを指定されたベースディレクトリからの絶対パスに解決
pub fn resolve_path_with_base(base: &str, relative: &str) -> PathBuf {
    let path = Path::new(relative);
    if path.is_absolute() {
        path.to_path_buf()
    } else if base.is_empty() {
        get_exe_dir().join(relative)
    } else {
        let base_path = Path::new(base);
        if base_path.is_absolute() {
            base_path.join(relative)
        } else {
            get_exe_dir().join(base).join(relative)
        }
    }
}

/// 設定ファイルのパスを取得
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join(CONFIG_FILENAME)
}

bitflags! {
    /// MAME起動オプション
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EmulatorFlags: u32 {
        /// ウィンドウモード（-window / -nowindow）
        const WINDOWED   = 0b0001;
        /// ソフトウェア描画（-video soft）
        const VIDEO_SOFT = 0b0010;
        /// 起動時からUIキー有効（-ui_active）
        const UI_ACTIVE  = 0b0100;
        /// ゲーム情報画面をスキップ（-skip_gameinfo）
        const SKIP_INTRO = 0b1000;
    }
}

/// ツールキット設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ホームディレクトリ（相対パスの基準）
    /// 空の場合は実行ファイルのディレクトリを使用
    pub home: String,
    /// z80asm のパス（区切り文字を含まなければPATHから探す）
    pub z80asm: String,
    /// z88dk-appmake のパス
    pub appmake: String,
    /// 作業ディレクトリ（.COM / .DSK の出力先）
    pub workdir: String,
    /// ORG（情報表示のみ、アセンブラには渡さない）
    pub origin: String,
    /// appmake +cpmdisk のフォーマット名
    pub cpmdisk_format: String,
    /// MAME のパス
    pub mame: String,
    /// MAME のマシン名
    pub machine: String,
    /// システムディスク（DOS80）。Boot Direct 時は使わない
    pub system_disk: String,
    /// ROMディレクトリ
    pub rompath: String,
    /// ビルドログの出力先
    pub log_dir: String,
    /// ソフトウェア描画
    pub video_soft: bool,
    /// ウィンドウモード
    pub windowed: bool,
    /// UIキー有効
    pub ui_active: bool,
    /// ゲーム情報画面をスキップ
    pub skip_intro: bool,
    /// ウィンドウ解像度（フロントエンド用、MAMEには渡さない）
    pub resolution: String,
    /// ブートローダーを書き込んでDOS80なしで直接起動
    pub boot_direct: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            home: String::new(),
            z80asm: "z80asm".to_string(),
            appmake: "z88dk-appmake".to_string(),
            workdir: "build".to_string(),
            origin: "256".to_string(),
            cpmdisk_format: DEFAULT_FORMAT.to_string(),
            mame: "mame".to_string(),
            machine: "einstein".to_string(),
            system_disk: "disks/DOS80.DSK".to_string(),
            rompath: "roms".to_string(),
            log_dir: "logs".to_string(),
            video_soft: true,
            windowed: true,
            ui_active: true,
            skip_intro: true,
            resolution: "800x600".to_string(),
            boot_direct: false,
        }
    }
}

impl Config {
    /// オプション指定で設定ファイルを読み込む
    /// 優先順位:
    /// 1. config_path が指定されている場合はそれを使用
    /// 2. home_path が指定されている場合は home_path/tbkit_config.json を探す
    /// 3. 実行ファイルディレクトリの tbkit_config.json
    ///
    /// home_path が指定されている場合、読み込んだ設定の home を上書き
    pub fn load_with_options(config_path: Option<&str>, home_path: Option<&str>) -> (Self, PathBuf) {
        let config_file_path = if let Some(path) = config_path {
            PathBuf::from(path)
        } else if let Some(home) = home_path {
            let home_config = Path::new(home).join(CONFIG_FILENAME);
            if home_config.exists() {
                home_config
            } else {
                get_config_path()
            }
        } else {
            get_config_path()
        };

        let mut config = Self::load_from(&config_file_path);

        // コマンドラインのhome指定を優先
        if let Some(home) = home_path {
            config.home = home.to_string();
        }

        (config, config_file_path)
    }

    /// 指定したパスから設定を読み込む
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Failed to parse config {:?}: {}, using defaults", path.as_ref(), e);
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    /// 指定したパスに設定を保存する
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(path, json).map_err(|e| format!("Failed to write config: {}", e))?;
        Ok(())
    }

    /// 相対パスをhomeからの絶対パスに解決
    pub fn resolve_path(&self, relative: &str) -> PathBuf {
        resolve_path_with_base(&self.home, relative)
    }

    /// ツールのパスを解決
    ///
    /// `z80asm` のような裸のコマンド名はPATH検索に任せるのでそのまま返す
    pub fn resolve_tool(&self, tool: &str) -> PathBuf {
        if tool.contains('/') || tool.contains(std::path::MAIN_SEPARATOR) {
            self.resolve_path(tool)
        } else {
            PathBuf::from(tool)
        }
    }

    /// 作業ディレクトリの絶対パスを取得
    pub fn workdir_path(&self) -> PathBuf {
        self.resolve_path(&self.workdir)
    }

    /// ログディレクトリの絶対パスを取得
    pub fn log_dir_path(&self) -> PathBuf {
        self.resolve_path(&self.log_dir)
    }

    /// システムディスクの絶対パスを取得
    pub fn system_disk_path(&self) -> PathBuf {
        self.resolve_path(&self.system_disk)
    }

    /// ROMディレクトリの絶対パスを取得
    pub fn rompath_path(&self) -> PathBuf {
        self.resolve_path(&self.rompath)
    }

    /// 空ならデフォルトに戻したディスクフォーマット
    pub fn disk_format(&self) -> &str {
        let fmt = self.cpmdisk_format.trim();
        if fmt.is_empty() {
            DEFAULT_FORMAT
        } else {
            fmt
        }
    }

    /// MAME起動オプション
    pub fn emulator_flags(&self) -> EmulatorFlags {
        let mut flags = EmulatorFlags::empty();
        flags.set(EmulatorFlags::WINDOWED, self.windowed);
        flags.set(EmulatorFlags::VIDEO_SOFT, self.video_soft);
        flags.set(EmulatorFlags::UI_ACTIVE, self.ui_active);
        flags.set(EmulatorFlags::SKIP_INTRO, self.skip_intro);
        flags
    }
}

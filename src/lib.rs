pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;
pub mod tool;

pub use commands::{run_invocation, Invocation, Mode};
pub use core::{SyncConfig, SyncEngine, SyncReport};
pub use error::{Result, SyncError};

/// 平台相关的配置目录
pub mod dirs {
    use std::path::PathBuf;

    const APP_DIR: &str = "resumedir";

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            // Linux
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }

    /// 默认应用目录
    pub fn app_config_dir() -> PathBuf {
        config_dir()
            .map(|p| p.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR)))
    }

    /// 数据目录：`config.json` 中的 `dataPath` 指向已存在的目录时使用它
    pub fn data_dir() -> PathBuf {
        let default_dir = app_config_dir();
        let config_file = default_dir.join("config.json");

        std::fs::read_to_string(&config_file)
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .and_then(|config| config.get("dataPath")?.as_str().map(PathBuf::from))
            .filter(|p| p.is_dir())
            .inspect(|p| tracing::debug!("使用自定义数据路径: {:?}", p))
            .unwrap_or(default_dir)
    }
}

//! 应用配置模块
//!
//! 所有配置都保存在配置目录下的 `config.json`，每个模块读取自己的小节，
//! 缺失或解析失败时使用默认值。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 读取 `config.json` 中的某个小节
pub(crate) fn load_section<T: DeserializeOwned + Default>(config_dir: &Path, key: &str) -> T {
    let config_file = config_dir.join("config.json");
    fs::read_to_string(&config_file)
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|config| config.get(key).cloned())
        .and_then(|section| serde_json::from_value::<T>(section).ok())
        .unwrap_or_default()
}

/// 外部传输工具配置
///
/// 参数模板中的 `{endpoint}` 替换为 `server:path` 形式的端点，
/// `{path}` 替换为本地路径。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// 可执行文件路径或名称
    #[serde(default = "default_tool_path")]
    pub path: String,
    /// 远程递归结构化列表
    #[serde(default = "default_list_args")]
    pub list_args: Vec<String>,
    /// 远程单条目查询
    #[serde(default = "default_describe_args")]
    pub describe_args: Vec<String>,
    /// 远程创建目录
    #[serde(default = "default_mkdir_args")]
    pub mkdir_args: Vec<String>,
    /// 传输时追加的续传参数
    #[serde(default = "default_resume_args")]
    pub resume_args: Vec<String>,
    /// 本地递归长列表命令（第一个元素为程序）
    #[serde(default = "default_local_list_args")]
    pub local_list_args: Vec<String>,
}

fn default_tool_path() -> String {
    "xfer".to_string()
}

fn default_list_args() -> Vec<String> {
    vec!["--list".into(), "-R".into(), "{endpoint}".into()]
}

fn default_describe_args() -> Vec<String> {
    vec!["--list".into(), "-d".into(), "{endpoint}".into()]
}

fn default_mkdir_args() -> Vec<String> {
    vec!["--mkdir".into(), "{endpoint}".into()]
}

fn default_resume_args() -> Vec<String> {
    vec!["--resume".into()]
}

fn default_local_list_args() -> Vec<String> {
    vec!["ls".into(), "-lR".into(), "{path}".into()]
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: default_tool_path(),
            list_args: default_list_args(),
            describe_args: default_describe_args(),
            mkdir_args: default_mkdir_args(),
            resume_args: default_resume_args(),
            local_list_args: default_local_list_args(),
        }
    }
}

impl ToolConfig {
    /// 从配置文件加载工具配置
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "tool")
    }
}

/// 同步行为配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// 文件并发传输数，1 表示完全顺序
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_transfers: usize,
    /// 单个条目分发失败后的重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 重试基础延迟（毫秒），按指数退避
    #[serde(default = "default_retry_delay")]
    pub retry_base_delay_ms: u64,
}

fn default_max_concurrent() -> usize {
    1
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    1000
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: default_max_concurrent(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_delay(),
        }
    }
}

impl SyncSettings {
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "sync")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ToolConfig::load(dir.path());
        assert_eq!(tool.path, "xfer");
        assert_eq!(SyncSettings::load(dir.path()).max_concurrent_transfers, 1);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"tool": {"path": "/opt/bin/xfer"}, "sync": {"maxRetries": 0}}"#,
        )
        .unwrap();

        let tool = ToolConfig::load(dir.path());
        assert_eq!(tool.path, "/opt/bin/xfer");
        assert_eq!(tool.resume_args, vec!["--resume".to_string()]);

        let sync = SyncSettings::load(dir.path());
        assert_eq!(sync.max_retries, 0);
        assert_eq!(sync.retry_base_delay_ms, 1000);
    }

    #[test]
    fn test_invalid_json_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "not json").unwrap();
        assert_eq!(ToolConfig::load(dir.path()).mkdir_args, default_mkdir_args());
    }
}

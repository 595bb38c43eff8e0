pub mod local;
pub mod remote;

use anyhow::Result;
use async_trait::async_trait;

pub use local::LocalStorage;
pub use remote::RemoteStorage;

/// 目标端探测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// 不存在
    Missing,
    /// 存在；目录的 size 无意义
    Present { size: u64, is_dir: bool },
    /// 所有探测手段都失败，状态未知
    Failed(String),
}

/// 同步目标端的存储抽象接口
#[async_trait]
pub trait Storage: Send + Sync {
    /// 查询路径是否存在及其大小
    async fn stat(&self, path: &str) -> Probe;

    /// 创建目录（含父目录）
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

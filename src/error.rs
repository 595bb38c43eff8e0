//! 错误类型定义

use thiserror::Error;

/// 同步过程中的致命错误
///
/// 单个条目的分发失败不在这里：它们被收集到 `SyncReport.errors`，不会中断整个运行。
#[derive(Error, Debug)]
pub enum SyncError {
    /// 配置的传输工具无法执行
    #[error("传输工具不可执行: {0}")]
    ExecutableNotFound(String),

    /// 无法判断源是文件还是目录
    #[error("无法识别源类型: {0}")]
    SourceInspection(String),

    /// 结构化列表中的行格式错误
    #[error("列表第 {line} 行格式错误: {reason}")]
    ListingParse { line: usize, reason: String },

    /// 列表命令本身执行失败
    #[error("列表命令失败: {0}")]
    ListingFailed(String),

    /// 列表返回了源根目录之外的路径
    #[error(transparent)]
    PathMap(#[from] crate::core::path_map::PathMapError),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// 进程退出码
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::ExecutableNotFound(_) => 2,
            SyncError::SourceInspection(_) => 3,
            SyncError::ListingParse { .. } => 4,
            SyncError::ListingFailed(_)
            | SyncError::PathMap(_)
            | SyncError::Config(_)
            | SyncError::Io(_) => 5,
        }
    }

    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        SyncError::ListingParse {
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

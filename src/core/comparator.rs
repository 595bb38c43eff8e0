use crate::core::entry::{Entry, EntryKind};
use crate::storage::{Probe, Storage};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    /// 隐藏条目（或隐藏目录下的条目）
    Hidden,
    /// 目标目录已存在
    Exists,
    /// 目标文件大小一致，视为已完成
    Complete,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Hidden => write!(f, "隐藏"),
            SkipReason::Exists => write!(f, "已存在"),
            SkipReason::Complete => write!(f, "已完成"),
        }
    }
}

/// 同步动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// 跳过，不调用外部工具
    Skip { path: String, reason: SkipReason },
    /// 在目标端创建目录
    CreateDirectory { dest_path: String },
    /// 传输文件；外部工具总是以续传模式调用
    Transfer {
        source_path: String,
        dest_path: String,
        size: u64,
        resume: bool,
    },
}

impl SyncAction {
    pub fn path(&self) -> &str {
        match self {
            SyncAction::Skip { path, .. } => path,
            SyncAction::CreateDirectory { dest_path } => dest_path,
            SyncAction::Transfer { dest_path, .. } => dest_path,
        }
    }
}

/// 单个条目的决策结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: SyncAction,
    /// 探测失败的原因；此时动作已升级为创建/传输
    pub probe_failure: Option<String>,
}

/// 根据探测结果决定动作
///
/// 完整性只看大小：大小相同但内容不同的文件会被当作已完成。
/// 探测失败时绝不假定一致，文件一律重新传输。
pub fn classify(entry: &Entry, dest_path: String, probe: Probe) -> Decision {
    let (action, probe_failure) = match (entry.kind, probe) {
        (EntryKind::Directory, Probe::Missing) => (SyncAction::CreateDirectory { dest_path }, None),
        (EntryKind::Directory, Probe::Present { .. }) => (
            SyncAction::Skip {
                path: dest_path,
                reason: SkipReason::Exists,
            },
            None,
        ),
        (EntryKind::Directory, Probe::Failed(reason)) => {
            (SyncAction::CreateDirectory { dest_path }, Some(reason))
        }
        // 目标位置是目录时不算完成，交给工具报错
        (EntryKind::File, Probe::Present { size, is_dir: false }) if size == entry.size => (
            SyncAction::Skip {
                path: dest_path,
                reason: SkipReason::Complete,
            },
            None,
        ),
        (EntryKind::File, probe) => {
            let failure = match probe {
                Probe::Failed(reason) => Some(reason),
                _ => None,
            };
            (
                SyncAction::Transfer {
                    source_path: entry.path.clone(),
                    dest_path,
                    size: entry.size,
                    resume: true,
                },
                failure,
            )
        }
    };

    Decision {
        action,
        probe_failure,
    }
}

/// 文件比较器，按列表顺序逐条决策
#[derive(Debug, Default)]
pub struct FileComparator {
    /// 已跳过的隐藏目录，其下的条目同样跳过
    hidden_dirs: HashSet<String>,
}

impl FileComparator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 逐级检查祖先路径，开销只与路径深度有关
    fn under_hidden_dir(&self, path: &str) -> bool {
        !self.hidden_dirs.is_empty()
            && path
                .match_indices('/')
                .any(|(i, _)| i > 0 && self.hidden_dirs.contains(&path[..i]))
    }

    /// 决定一个条目的动作；隐藏条目不会触发探测
    pub async fn decide(&mut self, entry: &Entry, dest_path: String, dest: &dyn Storage) -> Decision {
        if entry.hidden || self.under_hidden_dir(&entry.path) {
            if entry.hidden && entry.is_dir() {
                self.hidden_dirs.insert(entry.path.clone());
            }
            debug!("跳过隐藏条目: {}", entry.path);
            return Decision {
                action: SyncAction::Skip {
                    path: dest_path,
                    reason: SkipReason::Hidden,
                },
                probe_failure: None,
            };
        }

        let probe = dest.stat(&dest_path).await;
        let decision = classify(entry, dest_path, probe);

        if let Some(reason) = &decision.probe_failure {
            warn!(
                "无法确定目标状态，按未完成处理: {} ({})",
                decision.action.path(),
                reason
            );
        }

        decision
    }
}

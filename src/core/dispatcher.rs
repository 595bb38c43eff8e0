//! 分发器 - 将同步动作交给外部工具或目标存储执行

use crate::core::comparator::{SkipReason, SyncAction};
use crate::core::entry::TransferRoot;
use crate::storage::Storage;
use crate::tool::TransferTool;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// 进度通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncProgress {
    Skipped { path: String, reason: SkipReason },
    CreatingDirectory { path: String },
    Transferring { source: String, dest: String, size: u64 },
    Completed { path: String },
    Failed { path: String, error: String },
}

impl fmt::Display for SyncProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncProgress::Skipped { path, reason } => write!(f, "跳过 ({}): {}", reason, path),
            SyncProgress::CreatingDirectory { path } => write!(f, "创建目录: {}", path),
            SyncProgress::Transferring { source, dest, size } => {
                write!(f, "传输: {} -> {} ({} 字节)", source, dest, size)
            }
            SyncProgress::Completed { path } => write!(f, "完成: {}", path),
            SyncProgress::Failed { path, error } => write!(f, "失败: {}: {}", path, error),
        }
    }
}

/// 单个动作的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Skipped(SkipReason),
    DirectoryCreated,
    Transferred { bytes: u64 },
    Failed { path: String, error: String },
}

/// 分发器配置
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// 最大重试次数
    pub max_retries: u32,
    /// 重试基础延迟（毫秒）
    pub retry_base_delay_ms: u64,
}

/// 第 `attempt` 次重试前的等待时间，溢出时取上限
fn retry_delay_ms(base_delay_ms: u64, attempt: u32) -> u64 {
    2_u64
        .checked_pow(attempt)
        .map_or(u64::MAX, |factor| base_delay_ms.saturating_mul(factor))
}

/// 分发器
pub struct Dispatcher {
    tool: Arc<dyn TransferTool>,
    dest: Arc<dyn Storage>,
    source_root: TransferRoot,
    dest_root: TransferRoot,
    /// 透传给外部工具的选项
    extra_options: Vec<String>,
    config: DispatchConfig,
    cancelled: Arc<AtomicBool>,
    progress_tx: Option<mpsc::Sender<SyncProgress>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tool: Arc<dyn TransferTool>,
        dest: Arc<dyn Storage>,
        source_root: TransferRoot,
        dest_root: TransferRoot,
        extra_options: Vec<String>,
        config: DispatchConfig,
        cancelled: Arc<AtomicBool>,
        progress_tx: Option<mpsc::Sender<SyncProgress>>,
    ) -> Self {
        Self {
            tool,
            dest,
            source_root,
            dest_root,
            extra_options,
            config,
            cancelled,
            progress_tx,
        }
    }

    async fn notify(&self, progress: SyncProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(progress).await;
        }
    }

    /// 执行一个动作，失败时按指数退避重试
    pub async fn dispatch(&self, action: &SyncAction) -> DispatchOutcome {
        if let SyncAction::Skip { path, reason } = action {
            info!("跳过 ({}): {}", reason, path);
            self.notify(SyncProgress::Skipped {
                path: path.clone(),
                reason: *reason,
            })
            .await;
            return DispatchOutcome::Skipped(*reason);
        }

        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            // 首次执行不受取消影响，只是不再重试
            if attempt > 0 && self.cancelled.load(Ordering::SeqCst) {
                last_error = format!("{} (已取消重试)", last_error);
                break;
            }

            match self.execute(action).await {
                Ok(outcome) => {
                    self.notify(SyncProgress::Completed {
                        path: action.path().to_string(),
                    })
                    .await;
                    return outcome;
                }
                Err(e) => {
                    last_error = e.to_string();

                    if attempt < self.config.max_retries {
                        let delay = retry_delay_ms(self.config.retry_base_delay_ms, attempt);
                        warn!(
                            "操作失败，{}ms 后重试 ({}/{}): {}",
                            delay,
                            attempt + 1,
                            self.config.max_retries,
                            last_error
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    } else {
                        error!("操作最终失败 (已重试{}次): {}", self.config.max_retries, last_error);
                    }
                }
            }
        }

        let path = action.path().to_string();
        self.notify(SyncProgress::Failed {
            path: path.clone(),
            error: last_error.clone(),
        })
        .await;

        DispatchOutcome::Failed {
            path,
            error: last_error,
        }
    }

    /// 执行单个动作
    async fn execute(&self, action: &SyncAction) -> anyhow::Result<DispatchOutcome> {
        match action {
            SyncAction::Skip { reason, .. } => Ok(DispatchOutcome::Skipped(*reason)),
            SyncAction::CreateDirectory { dest_path } => {
                debug!("创建目录: {} ({})", dest_path, self.dest.name());
                self.notify(SyncProgress::CreatingDirectory {
                    path: dest_path.clone(),
                })
                .await;

                self.dest.create_dir(dest_path).await?;
                Ok(DispatchOutcome::DirectoryCreated)
            }
            SyncAction::Transfer {
                source_path,
                dest_path,
                size,
                resume,
            } => {
                let source = self.source_root.with_path(source_path.as_str());
                let dest = self.dest_root.with_path(dest_path.as_str());

                debug!("传输: {} -> {} ({}字节, resume={})", source, dest, size, resume);
                self.notify(SyncProgress::Transferring {
                    source: source.endpoint(),
                    dest: dest.endpoint(),
                    size: *size,
                })
                .await;

                self.tool
                    .transfer_file(&source, &dest, *resume, &self.extra_options)
                    .await?;
                Ok(DispatchOutcome::Transferred { bytes: *size })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{Call, Fixture};

    fn dispatcher(fixture: &Fixture, max_retries: u32) -> (Dispatcher, Arc<AtomicBool>) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let dispatcher = Dispatcher::new(
            fixture.tool.clone(),
            fixture.store.clone(),
            TransferRoot::remote("host", "/src"),
            TransferRoot::local("/dst"),
            Vec::new(),
            DispatchConfig {
                max_retries,
                retry_base_delay_ms: 1,
            },
            cancelled.clone(),
            None,
        );
        (dispatcher, cancelled)
    }

    fn transfer(name: &str) -> SyncAction {
        SyncAction::Transfer {
            source_path: format!("/src/{}", name),
            dest_path: format!("/dst/{}", name),
            size: 7,
            resume: true,
        }
    }

    #[tokio::test]
    async fn test_skip_makes_no_external_call() {
        let fixture = Fixture::new("");
        let (dispatcher, _) = dispatcher(&fixture, 2);

        let outcome = dispatcher
            .dispatch(&SyncAction::Skip {
                path: "/dst/a".into(),
                reason: SkipReason::Complete,
            })
            .await;

        assert_eq!(outcome, DispatchOutcome::Skipped(SkipReason::Complete));
        assert!(fixture.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_directory_on_destination() {
        let fixture = Fixture::new("");
        let (dispatcher, _) = dispatcher(&fixture, 0);

        let outcome = dispatcher
            .dispatch(&SyncAction::CreateDirectory {
                dest_path: "/dst/sub".into(),
            })
            .await;

        assert_eq!(outcome, DispatchOutcome::DirectoryCreated);
        assert!(fixture.store.has_dir("/dst/sub"));
    }

    #[tokio::test]
    async fn test_transfer_retries_until_success() {
        let fixture = Fixture::new("");
        fixture.tool.source_size("/src/a", 7);
        fixture.tool.fail_transfer("/dst/a", 2);
        let (dispatcher, _) = dispatcher(&fixture, 2);

        let outcome = dispatcher.dispatch(&transfer("a")).await;

        assert_eq!(outcome, DispatchOutcome::Transferred { bytes: 7 });
        assert_eq!(fixture.calls().len(), 3);
        assert_eq!(fixture.store.file_size("/dst/a"), Some(7));
    }

    #[tokio::test]
    async fn test_transfer_fails_after_retries() {
        let fixture = Fixture::new("");
        fixture.tool.fail_transfer("/dst/a", 5);
        let (dispatcher, _) = dispatcher(&fixture, 1);

        let outcome = dispatcher.dispatch(&transfer("a")).await;

        match outcome {
            DispatchOutcome::Failed { path, error } => {
                assert_eq!(path, "/dst/a");
                assert!(error.contains("simulated"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(fixture.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_no_retry_after_cancel() {
        let fixture = Fixture::new("");
        fixture.tool.fail_transfer("/dst/a", 1);
        let (dispatcher, cancelled) = dispatcher(&fixture, 3);
        cancelled.store(true, Ordering::SeqCst);

        let outcome = dispatcher.dispatch(&transfer("a")).await;

        assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
        assert!(matches!(fixture.calls().as_slice(), [Call::Transfer { .. }]));
    }

    #[test]
    fn test_retry_delay_saturates() {
        assert_eq!(retry_delay_ms(1000, 0), 1000);
        assert_eq!(retry_delay_ms(1000, 3), 8000);
        assert_eq!(retry_delay_ms(1000, 60), u64::MAX);
        assert_eq!(retry_delay_ms(1000, 64), u64::MAX);
    }

    #[test]
    fn test_progress_display() {
        let note = SyncProgress::Skipped {
            path: "/dst/a".into(),
            reason: SkipReason::Hidden,
        };
        assert_eq!(note.to_string(), "跳过 (隐藏): /dst/a");

        let json = serde_json::to_string(&SyncProgress::Completed { path: "/dst/a".into() }).unwrap();
        assert_eq!(json, r#"{"type":"completed","path":"/dst/a"}"#);
    }
}

use crate::config::SyncSettings;
use crate::core::comparator::{FileComparator, SkipReason, SyncAction};
use crate::core::dispatcher::{DispatchConfig, DispatchOutcome, Dispatcher, SyncProgress};
use crate::core::entry::TransferRoot;
use crate::core::listing::EntrySource;
use crate::core::path_map::map_path;
use crate::error::Result;
use crate::storage::Storage;
use crate::tool::TransferTool;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// 传输方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 本地 -> 远程
    Upload,
    /// 远程 -> 本地
    Download,
}

/// 一次同步运行的输入，运行期间不变
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub direction: Direction,
    pub source: TransferRoot,
    pub dest: TransferRoot,
    /// 透传给外部工具的选项
    pub extra_options: Vec<String>,
}

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 最大并发传输数（目录创建总是顺序执行）
    pub max_concurrent_transfers: usize,
    /// 最大重试次数
    pub max_retries: u32,
    /// 重试基础延迟（毫秒）
    pub retry_base_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncSettings::default().into()
    }
}

impl From<SyncSettings> for SyncConfig {
    fn from(settings: SyncSettings) -> Self {
        Self {
            max_concurrent_transfers: settings.max_concurrent_transfers.max(1),
            max_retries: settings.max_retries,
            retry_base_delay_ms: settings.retry_base_delay_ms,
        }
    }
}

/// 同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Completed,
    Failed,
    Cancelled,
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub direction: Direction,
    pub source: String,
    pub dest: String,
    pub start_time: i64,
    pub end_time: i64,
    pub status: SyncStatus,
    pub entries_scanned: u64,
    pub dirs_created: u64,
    pub files_transferred: u64,
    pub skipped_complete: u64,
    pub skipped_exists: u64,
    pub skipped_hidden: u64,
    pub probe_failures: u64,
    pub files_failed: u64,
    pub bytes_transferred: u64,
    pub duration: u64,
    pub errors: Vec<String>,
}

impl SyncReport {
    fn new(plan: &SyncPlan) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            direction: plan.direction,
            source: plan.source.endpoint(),
            dest: plan.dest.endpoint(),
            start_time: now,
            end_time: now,
            status: SyncStatus::Completed,
            entries_scanned: 0,
            dirs_created: 0,
            files_transferred: 0,
            skipped_complete: 0,
            skipped_exists: 0,
            skipped_hidden: 0,
            probe_failures: 0,
            files_failed: 0,
            bytes_transferred: 0,
            duration: 0,
            errors: Vec::new(),
        }
    }

    fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Skipped(SkipReason::Complete) => self.skipped_complete += 1,
            DispatchOutcome::Skipped(SkipReason::Exists) => self.skipped_exists += 1,
            DispatchOutcome::Skipped(SkipReason::Hidden) => self.skipped_hidden += 1,
            DispatchOutcome::DirectoryCreated => self.dirs_created += 1,
            DispatchOutcome::Transferred { bytes } => {
                self.files_transferred += 1;
                self.bytes_transferred += bytes;
            }
            DispatchOutcome::Failed { path, error } => {
                self.files_failed += 1;
                self.errors.push(format!("{}: {}", path, error));
            }
        }
    }

    fn finish(&mut self, cancelled: bool) {
        self.end_time = chrono::Utc::now().timestamp();
        self.duration = (self.end_time - self.start_time).max(0) as u64;
        self.status = if cancelled {
            SyncStatus::Cancelled
        } else if self.files_failed > 0 {
            SyncStatus::Failed
        } else {
            SyncStatus::Completed
        };
    }

    /// 进程退出码
    pub fn exit_code(&self) -> u8 {
        match self.status {
            SyncStatus::Completed => 0,
            SyncStatus::Failed => 1,
            SyncStatus::Cancelled => 130,
        }
    }
}

/// 同步引擎
pub struct SyncEngine {
    tool: Arc<dyn TransferTool>,
    dest: Arc<dyn Storage>,
    config: SyncConfig,
    cancelled: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(tool: Arc<dyn TransferTool>, dest: Arc<dyn Storage>) -> Self {
        Self::with_config(tool, dest, SyncConfig::default())
    }

    pub fn with_config(tool: Arc<dyn TransferTool>, dest: Arc<dyn Storage>, config: SyncConfig) -> Self {
        Self {
            tool,
            dest,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 取消同步：当前正在执行的分发完成后停止
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// 取消标志，供信号处理任务使用
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// 检查是否已取消
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 运行同步：按列表顺序逐条决策并分发
    ///
    /// 目录创建在读取下一个条目之前完成，因此任何文件传输开始时其父目录已经存在。
    /// 致命错误（列表解析、路径越界）会在等待已发出的传输结束后返回。
    pub async fn run_sync(
        &self,
        plan: &SyncPlan,
        listing: &mut dyn EntrySource,
        progress_tx: Option<mpsc::Sender<SyncProgress>>,
    ) -> Result<SyncReport> {
        info!(
            "开始同步 ({:?}): {} -> {} (目标: {}, 工具: {})",
            plan.direction,
            plan.source,
            plan.dest,
            self.dest.name(),
            self.tool.name()
        );

        let mut report = SyncReport::new(plan);
        let dispatcher = Arc::new(Dispatcher::new(
            self.tool.clone(),
            self.dest.clone(),
            plan.source.clone(),
            plan.dest.clone(),
            plan.extra_options.clone(),
            DispatchConfig {
                max_retries: self.config.max_retries,
                retry_base_delay_ms: self.config.retry_base_delay_ms,
            },
            self.cancelled.clone(),
            progress_tx,
        ));

        let mut comparator = FileComparator::new();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_transfers.max(1)));
        let mut in_flight: JoinSet<DispatchOutcome> = JoinSet::new();

        let result = loop {
            if self.is_cancelled() {
                warn!("同步已取消，等待进行中的传输完成");
                break Ok(());
            }

            // 收集已完成的并发传输
            while let Some(joined) = in_flight.try_join_next() {
                Self::collect(&mut report, joined);
            }

            let entry = match listing.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            report.entries_scanned += 1;

            let dest_path = match map_path(&plan.source.path, &plan.dest.path, &entry.path) {
                Ok(p) => p,
                Err(e) => break Err(e.into()),
            };

            let decision = comparator.decide(&entry, dest_path, self.dest.as_ref()).await;
            if decision.probe_failure.is_some() {
                report.probe_failures += 1;
            }

            match decision.action {
                action @ SyncAction::Transfer { .. } if self.config.max_concurrent_transfers > 1 => {
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            error!("获取传输许可失败: {}", e);
                            report.record(dispatcher.dispatch(&action).await);
                            continue;
                        }
                    };
                    let dispatcher = dispatcher.clone();
                    in_flight.spawn(async move {
                        let outcome = dispatcher.dispatch(&action).await;
                        drop(permit);
                        outcome
                    });
                }
                action => {
                    let outcome = dispatcher.dispatch(&action).await;
                    report.record(outcome);
                }
            }
        };

        // 等待所有已发出的传输，不留下半途的外部调用
        while let Some(joined) = in_flight.join_next().await {
            Self::collect(&mut report, joined);
        }

        if let Err(e) = result {
            error!("同步中止: {}", e);
            return Err(e);
        }

        report.finish(self.is_cancelled());

        info!(
            "同步完成 ({:?}): 创建目录 {}, 传输 {}, 跳过 {}, 失败 {}",
            report.status,
            report.dirs_created,
            report.files_transferred,
            report.skipped_complete + report.skipped_exists + report.skipped_hidden,
            report.files_failed
        );

        Ok(report)
    }

    fn collect(report: &mut SyncReport, joined: std::result::Result<DispatchOutcome, tokio::task::JoinError>) {
        match joined {
            Ok(outcome) => report.record(outcome),
            Err(e) => {
                debug!("传输任务异常结束: {}", e);
                report.record(DispatchOutcome::Failed {
                    path: "<task>".to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}

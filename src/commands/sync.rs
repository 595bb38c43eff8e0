//! 同步命令：按模式转发给工具或运行目录续传

use super::invocation::{Invocation, Mode};
use crate::config::{SyncSettings, ToolConfig};
use crate::core::entry::{EntryKind, TransferRoot};
use crate::core::{Direction, SyncEngine, SyncPlan, SyncProgress, SyncReport};
use crate::error::{Result, SyncError};
use crate::storage::{LocalStorage, RemoteStorage, Storage};
use crate::tool::{CommandTool, RemoteDescription, TransferTool};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 源端的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Directory,
    File,
}

/// 从数据目录加载配置并执行一次调用，返回进程退出码
pub async fn run_invocation(args: &[String]) -> Result<u8> {
    let config_dir = crate::dirs::data_dir();
    debug!("配置目录: {:?}", config_dir);

    execute(
        args,
        ToolConfig::load(&config_dir),
        SyncSettings::load(&config_dir),
    )
    .await
}

/// 使用给定配置执行一次调用
pub async fn execute(args: &[String], mut tool_config: ToolConfig, settings: SyncSettings) -> Result<u8> {
    let invocation = Invocation::parse(args)?;
    if let Some(path) = &invocation.tool_path {
        tool_config.path = path.clone();
    }

    let tool = Arc::new(CommandTool::new(tool_config));
    let executable = tool.ensure_available()?;
    debug!("传输工具: {:?}", executable);

    let mode = invocation.mode();
    info!("运行模式: {:?}", mode);

    let (direction, source, dest) = match (mode, invocation.source.clone(), invocation.dest.clone()) {
        (Mode::DownloadDirectoryResume, Some(source), Some(dest)) => (Direction::Download, source, dest),
        (Mode::UploadDirectoryResume, Some(source), Some(dest)) => (Direction::Upload, source, dest),
        _ => return passthrough(&tool, &invocation).await,
    };

    match inspect_source(tool.as_ref(), &source).await? {
        SourceKind::Directory => {}
        SourceKind::File => {
            // 单个文件由工具自己续传
            info!("源是文件，直接交给工具: {}", source);
            return passthrough(&tool, &invocation).await;
        }
    }

    let plan = SyncPlan {
        direction,
        source,
        dest,
        extra_options: invocation.extra_options.clone(),
    };
    let report = run_plan(tool, &plan, settings).await?;
    print_summary(&report);
    Ok(report.exit_code())
}

async fn passthrough(tool: &CommandTool, invocation: &Invocation) -> Result<u8> {
    let code = tool.passthrough(&invocation.forwarded).await?;
    debug!("工具退出码: {}", code);
    Ok(u8::try_from(code).unwrap_or(1))
}

/// 判断源是文件还是目录；两者都不是时为致命错误
async fn inspect_source(tool: &dyn TransferTool, source: &TransferRoot) -> Result<SourceKind> {
    if source.is_remote() {
        return match tool.describe_remote(source).await {
            RemoteDescription::Exists(record) => Ok(match record.kind() {
                EntryKind::Directory => SourceKind::Directory,
                EntryKind::File => SourceKind::File,
            }),
            RemoteDescription::NotFound => Err(SyncError::SourceInspection(format!("源不存在: {}", source))),
            RemoteDescription::QueryFailed(reason) => {
                Err(SyncError::SourceInspection(format!("{}: {}", source, reason)))
            }
        };
    }

    let metadata = tokio::fs::metadata(&source.path)
        .await
        .map_err(|e| SyncError::SourceInspection(format!("{}: {}", source, e)))?;
    if metadata.is_dir() {
        Ok(SourceKind::Directory)
    } else if metadata.is_file() {
        Ok(SourceKind::File)
    } else {
        Err(SyncError::SourceInspection(format!("既不是文件也不是目录: {}", source)))
    }
}

/// 建立列表和目标存储，运行引擎；Ctrl-C 会在当前分发完成后停止
async fn run_plan(tool: Arc<CommandTool>, plan: &SyncPlan, settings: SyncSettings) -> Result<SyncReport> {
    let local = LocalStorage::new(tool.config().local_list_args.clone());

    let (mut listing, dest) = match plan.direction {
        Direction::Download => {
            let listing = tool.list_remote_recursive(&plan.source).await?;
            (listing, Arc::new(local) as Arc<dyn Storage>)
        }
        Direction::Upload => {
            let listing = local.list_recursive(&plan.source.path)?;
            let remote = RemoteStorage::new(tool.clone(), &plan.dest.server);
            (listing, Arc::new(remote) as Arc<dyn Storage>)
        }
    };

    let engine = SyncEngine::with_config(tool, dest, settings.into());

    let cancel_flag = engine.cancel_flag();
    let ctrl_c_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("无法监听 Ctrl-C");
            return;
        }
        eprintln!("\n收到 Ctrl-C，当前条目完成后停止...");
        cancel_flag.store(true, Ordering::SeqCst);
    });
    scopeguard::defer! {
        ctrl_c_task.abort();
    }

    let (progress_tx, progress_rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_progress(progress_rx));

    let result = engine.run_sync(plan, listing.as_mut(), Some(progress_tx)).await;
    // 发送端随引擎运行结束而关闭，打印任务随之退出
    let _ = printer.await;
    result
}

async fn print_progress(mut rx: mpsc::Receiver<SyncProgress>) {
    while let Some(progress) = rx.recv().await {
        eprintln!("{}", progress);
    }
}

fn print_summary(report: &SyncReport) {
    eprintln!(
        "{} -> {}: 创建目录 {}, 传输 {} ({} 字节), 跳过 {} (已完成 {}, 已存在 {}, 隐藏 {}), 失败 {}",
        report.source,
        report.dest,
        report.dirs_created,
        report.files_transferred,
        report.bytes_transferred,
        report.skipped_complete + report.skipped_exists + report.skipped_hidden,
        report.skipped_complete,
        report.skipped_exists,
        report.skipped_hidden,
        report.files_failed
    );
    if report.probe_failures > 0 {
        eprintln!("{} 个目标状态无法确定，已重新传输", report.probe_failures);
    }
    for error in &report.errors {
        eprintln!("  {}", error);
    }
}

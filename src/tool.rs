//! 外部传输工具 - 通过子进程调用的四个能力：
//! 远程递归列表、远程单条目查询、远程建目录、带续传的文件传输

use crate::config::ToolConfig;
use crate::core::entry::{Entry, TransferRoot};
use crate::core::listing::{EntryReader, EntrySource, ListingFormat, RemoteRecord};
use crate::error::{Result, SyncError};
use anyhow::anyhow;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// 远程单条目查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDescription {
    Exists(RemoteRecord),
    NotFound,
    /// 查询本身失败（进程无法启动、被信号终止、输出无法解析）
    QueryFailed(String),
}

/// 外部传输工具抽象接口
#[async_trait]
pub trait TransferTool: Send + Sync {
    /// 递归列出远程目录，按列表顺序逐条产生
    async fn list_remote_recursive(&self, root: &TransferRoot) -> Result<Box<dyn EntrySource>>;

    /// 查询远程单个条目
    async fn describe_remote(&self, target: &TransferRoot) -> RemoteDescription;

    /// 创建远程目录
    async fn create_remote_dir(&self, target: &TransferRoot) -> anyhow::Result<()>;

    /// 传输单个文件；`resume` 为 true 时续传或修正已有的部分文件
    async fn transfer_file(
        &self,
        source: &TransferRoot,
        dest: &TransferRoot,
        resume: bool,
        extra_options: &[String],
    ) -> anyhow::Result<()>;

    /// 工具名称（用于日志）
    fn name(&self) -> &str;
}

/// 展开参数模板
pub(crate) fn expand_args(template: &[String], endpoint: &str, path: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| arg.replace("{endpoint}", endpoint).replace("{path}", path))
        .collect()
}

/// 检查程序是否可执行：含路径分隔符时直接检查，否则在 PATH 中查找
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let full = dir.join(program);
        if is_executable(&full) {
            return Some(full);
        }
        #[cfg(windows)]
        {
            let exe = full.with_extension("exe");
            if is_executable(&exe) {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// 启动子进程，程序不存在时映射为 ExecutableNotFound
fn spawn(command: &mut Command, program: &str) -> Result<Child> {
    command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SyncError::ExecutableNotFound(program.to_string())
        } else {
            SyncError::Io(e)
        }
    })
}

/// 以子进程输出为来源的列表
///
/// 列表读完后检查进程退出状态，非零视为列表失败。
pub struct ListingProcess {
    description: String,
    child: Child,
    reader: EntryReader<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    finished: bool,
}

impl ListingProcess {
    pub fn spawn(program: &str, args: &[String], format: ListingFormat) -> Result<Self> {
        let description = format!("{} {}", program, args.join(" "));
        debug!("启动列表命令: {}", description);

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if format == ListingFormat::LocalRecursive {
            // `total` 行和日期随语言环境翻译，统一使用 C 格式
            command.env("LC_ALL", "C");
        }

        let mut child = spawn(&mut command, program)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SyncError::ListingFailed(format!("{}: 无法读取输出", description)))?;

        // 单独收集 stderr，避免管道写满阻塞子进程
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf).await;
                buf
            })
        });

        Ok(Self {
            description,
            child,
            reader: EntryReader::new(BufReader::new(stdout), format),
            stderr,
            finished: false,
        })
    }

    async fn finish(&mut self) -> Result<()> {
        self.finished = true;
        let status = self.child.wait().await?;
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            trace!("列表命令结束: {}", self.description);
            Ok(())
        } else {
            Err(SyncError::ListingFailed(format!(
                "{} ({}): {}",
                self.description,
                status,
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl EntrySource for ListingProcess {
    async fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.finished {
            return Ok(None);
        }
        match self.reader.next_entry().await? {
            Some(entry) => Ok(Some(entry)),
            None => {
                self.finish().await?;
                Ok(None)
            }
        }
    }
}

/// 通过命令行调用外部工具
pub struct CommandTool {
    config: ToolConfig,
}

impl CommandTool {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// 确认工具可执行，在任何工作开始前调用
    pub fn ensure_available(&self) -> Result<PathBuf> {
        find_executable(&self.config.path)
            .ok_or_else(|| SyncError::ExecutableNotFound(self.config.path.clone()))
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.path);
        command.stdin(Stdio::null());
        command
    }

    /// 原样转发整个调用，返回工具的退出码
    pub async fn passthrough(&self, args: &[String]) -> Result<i32> {
        info!("直接转发给 {}: {:?}", self.config.path, args);
        let mut command = Command::new(&self.config.path);
        command.args(args);
        let status = spawn(&mut command, &self.config.path)?.wait().await?;
        Ok(status.code().unwrap_or(1))
    }
}

#[async_trait]
impl TransferTool for CommandTool {
    async fn list_remote_recursive(&self, root: &TransferRoot) -> Result<Box<dyn EntrySource>> {
        let args = expand_args(&self.config.list_args, &root.endpoint(), &root.path);
        let process = ListingProcess::spawn(&self.config.path, &args, ListingFormat::RemoteStructured)?;
        Ok(Box::new(process))
    }

    async fn describe_remote(&self, target: &TransferRoot) -> RemoteDescription {
        let args = expand_args(&self.config.describe_args, &target.endpoint(), &target.path);
        let output = match self.command().args(&args).output().await {
            Ok(output) => output,
            Err(e) => return RemoteDescription::QueryFailed(format!("无法启动查询: {}", e)),
        };

        match output.status.code() {
            None => RemoteDescription::QueryFailed(format!("查询被终止: {}", output.status)),
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                match stdout.lines().find(|l| !l.trim().is_empty()) {
                    Some(line) => match RemoteRecord::parse(line) {
                        Ok(record) => RemoteDescription::Exists(record),
                        Err(e) => RemoteDescription::QueryFailed(format!("无法解析查询结果: {}", e)),
                    },
                    None => RemoteDescription::QueryFailed("查询结果为空".to_string()),
                }
            }
            Some(code) => {
                trace!("远程条目不存在: {} (exit {})", target, code);
                RemoteDescription::NotFound
            }
        }
    }

    async fn create_remote_dir(&self, target: &TransferRoot) -> anyhow::Result<()> {
        let args = expand_args(&self.config.mkdir_args, &target.endpoint(), &target.path);
        let output = self.command().args(&args).output().await?;
        if !output.status.success() {
            return Err(anyhow!(
                "创建远程目录失败 {}: {}",
                target,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }

    async fn transfer_file(
        &self,
        source: &TransferRoot,
        dest: &TransferRoot,
        resume: bool,
        extra_options: &[String],
    ) -> anyhow::Result<()> {
        let mut command = self.command();
        command.args(extra_options);
        if resume {
            command.args(&self.config.resume_args);
        }
        command.arg(source.endpoint()).arg(dest.endpoint());

        // 进度输出直接交给终端
        let status = command.status().await?;
        if !status.success() {
            return Err(anyhow!("传输失败 {} -> {} ({})", source, dest, status));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.config.path
    }
}

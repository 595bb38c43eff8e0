//! 测试用的外部工具和内存存储

use crate::core::entry::TransferRoot;
use crate::core::listing::{EntryReader, EntrySource, ListingFormat};
use crate::storage::{Probe, Storage};
use crate::tool::{RemoteDescription, TransferTool};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// 记录下来的外部调用，按发生顺序
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Stat(String),
    CreateDir(String),
    Transfer {
        source: String,
        dest: String,
        resume: bool,
        extra: Vec<String>,
    },
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// 内存中的目标端
pub struct MemoryStorage {
    files: Mutex<HashMap<String, u64>>,
    dirs: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    log: CallLog,
}

impl MemoryStorage {
    pub fn new(log: CallLog) -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            dirs: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            log,
        }
    }

    pub fn put_file(&self, path: &str, size: u64) {
        self.files.lock().unwrap().insert(path.to_string(), size);
    }

    pub fn put_dir(&self, path: &str) {
        self.dirs.lock().unwrap().insert(path.to_string());
    }

    /// 该路径的探测总是失败
    pub fn fail_probe(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn file_size(&self, path: &str) -> Option<u64> {
        self.files.lock().unwrap().get(path).copied()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.dirs.lock().unwrap().contains(path)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn stat(&self, path: &str) -> Probe {
        self.log.lock().unwrap().push(Call::Stat(path.to_string()));
        if self.failing.lock().unwrap().contains(path) {
            return Probe::Failed("simulated probe failure".to_string());
        }
        if self.dirs.lock().unwrap().contains(path) {
            return Probe::Present { size: 0, is_dir: true };
        }
        match self.files.lock().unwrap().get(path) {
            Some(size) => Probe::Present {
                size: *size,
                is_dir: false,
            },
            None => Probe::Missing,
        }
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.log.lock().unwrap().push(Call::CreateDir(path.to_string()));
        self.dirs.lock().unwrap().insert(path.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// 记录调用的外部工具；传输成功时把文件写入目标存储
pub struct MockTool {
    store: Arc<MemoryStorage>,
    listing: String,
    /// 源路径 -> 大小，传输完成后写入目标
    source_sizes: Mutex<HashMap<String, u64>>,
    /// 目标路径 -> 剩余失败次数
    failures: Mutex<HashMap<String, u32>>,
    log: CallLog,
}

impl MockTool {
    pub fn new(store: Arc<MemoryStorage>, log: CallLog, listing: &str) -> Self {
        Self {
            store,
            listing: listing.to_string(),
            source_sizes: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            log,
        }
    }

    pub fn source_size(&self, source_path: &str, size: u64) {
        self.source_sizes
            .lock()
            .unwrap()
            .insert(source_path.to_string(), size);
    }

    /// 对目标路径的传输先失败 `times` 次
    pub fn fail_transfer(&self, dest_path: &str, times: u32) {
        self.failures.lock().unwrap().insert(dest_path.to_string(), times);
    }
}

#[async_trait]
impl TransferTool for MockTool {
    async fn list_remote_recursive(
        &self,
        _root: &TransferRoot,
    ) -> crate::error::Result<Box<dyn EntrySource>> {
        Ok(Box::new(EntryReader::new(
            Cursor::new(self.listing.clone().into_bytes()),
            ListingFormat::RemoteStructured,
        )))
    }

    async fn describe_remote(&self, target: &TransferRoot) -> RemoteDescription {
        match self.store.stat(&target.path).await {
            Probe::Missing => RemoteDescription::NotFound,
            Probe::Failed(reason) => RemoteDescription::QueryFailed(reason),
            Probe::Present { size, is_dir } => {
                let flag = if is_dir { "D" } else { "F" };
                let line = format!("{} {:x} 0 {} 644 0 -", target.path, size, flag);
                match crate::core::listing::RemoteRecord::parse(&line) {
                    Ok(record) => RemoteDescription::Exists(record),
                    Err(e) => RemoteDescription::QueryFailed(e),
                }
            }
        }
    }

    async fn create_remote_dir(&self, target: &TransferRoot) -> Result<()> {
        self.store.create_dir(&target.path).await
    }

    async fn transfer_file(
        &self,
        source: &TransferRoot,
        dest: &TransferRoot,
        resume: bool,
        extra_options: &[String],
    ) -> Result<()> {
        self.log.lock().unwrap().push(Call::Transfer {
            source: source.endpoint(),
            dest: dest.endpoint(),
            resume,
            extra: extra_options.to_vec(),
        });

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&dest.path) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(anyhow!("simulated transfer failure"));
                }
            }
        }

        let size = self
            .source_sizes
            .lock()
            .unwrap()
            .get(&source.path)
            .copied()
            .unwrap_or(0);
        self.store.put_file(&dest.path, size);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 一组共享调用日志的测试对象
pub struct Fixture {
    pub log: CallLog,
    pub store: Arc<MemoryStorage>,
    pub tool: Arc<MockTool>,
}

impl Fixture {
    pub fn new(listing: &str) -> Self {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::new(MemoryStorage::new(log.clone()));
        let tool = Arc::new(MockTool::new(store.clone(), log.clone(), listing));
        Self { log, store, tool }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    /// 除探测外的调用
    pub fn dispatches(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Stat(_)))
            .collect()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }
}

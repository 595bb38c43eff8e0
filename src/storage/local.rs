use super::{Probe, Storage};
use crate::core::listing::{EntrySource, ListingFormat};
use crate::error::{Result as SyncResult, SyncError};
use crate::tool::{expand_args, ListingProcess};
use anyhow::Result;
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncSeekExt;
use tracing::{debug, warn};

/// 本地文件系统
pub struct LocalStorage {
    /// 本地递归长列表命令
    list_command: Vec<String>,
    name: String,
}

impl LocalStorage {
    pub fn new(list_command: Vec<String>) -> Self {
        Self {
            list_command,
            name: "local".to_string(),
        }
    }

    /// 递归长列表（`ls -lR`），按块顺序逐条产生
    pub fn list_recursive(&self, root: &str) -> SyncResult<Box<dyn EntrySource>> {
        let (program, template) = self
            .list_command
            .split_first()
            .ok_or_else(|| SyncError::Config("本地列表命令为空".to_string()))?;
        let args = expand_args(template, root, root);
        let process = ListingProcess::spawn(program, &args, ListingFormat::LocalRecursive)?;
        Ok(Box::new(process))
    }

    /// 备用的大小查询：打开文件并定位到末尾
    async fn size_by_seek(path: &Path) -> std::io::Result<u64> {
        let mut file = fs::File::open(path).await?;
        file.seek(SeekFrom::End(0)).await
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn stat(&self, path: &str) -> Probe {
        let full_path = Path::new(path);

        let error = match fs::metadata(full_path).await {
            Ok(metadata) => {
                return Probe::Present {
                    size: if metadata.is_dir() { 0 } else { metadata.len() },
                    is_dir: metadata.is_dir(),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Probe::Missing,
            Err(e) => e,
        };

        // metadata 不可用时尝试直接读取文件长度
        debug!("metadata 查询失败 {}: {}，尝试 seek", path, error);
        match Self::size_by_seek(full_path).await {
            Ok(size) => Probe::Present { size, is_dir: false },
            Err(seek_error) => {
                warn!("无法获取本地文件大小 {}: {}; {}", path, error, seek_error);
                Probe::Failed(format!("{}; {}", error, seek_error))
            }
        }
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(path).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

use super::{Probe, Storage};
use crate::core::entry::{EntryKind, TransferRoot};
use crate::tool::{RemoteDescription, TransferTool};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// 通过外部工具访问的远程端
pub struct RemoteStorage {
    tool: Arc<dyn TransferTool>,
    server: String,
    name: String,
}

impl RemoteStorage {
    pub fn new(tool: Arc<dyn TransferTool>, server: &str) -> Self {
        let name = format!("remote:{}", server);
        Self {
            tool,
            server: server.to_string(),
            name,
        }
    }

    fn target(&self, path: &str) -> TransferRoot {
        TransferRoot::remote(self.server.clone(), path)
    }
}

#[async_trait]
impl Storage for RemoteStorage {
    async fn stat(&self, path: &str) -> Probe {
        match self.tool.describe_remote(&self.target(path)).await {
            RemoteDescription::Exists(record) => Probe::Present {
                size: record.size,
                is_dir: record.kind() == EntryKind::Directory,
            },
            RemoteDescription::NotFound => Probe::Missing,
            RemoteDescription::QueryFailed(reason) => {
                debug!("远程查询失败 {}:{}: {}", self.server, path, reason);
                Probe::Failed(reason)
            }
        }
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.tool.create_remote_dir(&self.target(path)).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

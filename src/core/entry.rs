use serde::{Deserialize, Serialize};
use std::fmt;

/// 条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// 源列表中的一个节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// 以源根为前缀的路径，使用 `/` 分隔，无结尾斜杠
    pub path: String,
    pub kind: EntryKind,
    /// 字节数，目录无意义
    pub size: u64,
    /// 隐藏条目总是跳过
    pub hidden: bool,
}

impl Entry {
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size,
            hidden: false,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size: 0,
            hidden: false,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// 传输的一端：(服务器, 路径)，本地端 server 为空
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRoot {
    pub server: String,
    pub path: String,
}

impl TransferRoot {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            server: String::new(),
            path: path.into(),
        }
    }

    pub fn remote(server: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            path: path.into(),
        }
    }

    pub fn is_remote(&self) -> bool {
        !self.server.is_empty()
    }

    /// 同一端上的另一个路径
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self {
            server: self.server.clone(),
            path: path.into(),
        }
    }

    /// 传给外部工具的端点字符串
    pub fn endpoint(&self) -> String {
        if self.is_remote() {
            format!("{}:{}", self.server, self.path)
        } else {
            self.path.clone()
        }
    }
}

impl fmt::Display for TransferRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.endpoint())
    }
}

/// 解析远程列表中的十六进制大小
///
/// 空字符串是错误，不是 0。
pub fn hex_size(field: &str) -> Result<u64, String> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);

    if digits.is_empty() {
        return Err("大小字段为空".to_string());
    }

    u64::from_str_radix(digits, 16).map_err(|e| format!("无效的十六进制大小 {:?}: {}", field, e))
}

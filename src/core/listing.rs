//! 列表解析 - 将本地递归长列表或远程结构化列表逐行转换为条目
//!
//! 解析是逐行进行的，不会在内存中累积整棵树。

use super::entry::{hex_size, Entry, EntryKind};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, trace};

/// 列表格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingFormat {
    /// `ls -lR` 风格的分块长列表
    LocalRecursive,
    /// 外部工具的七字段远程列表
    RemoteStructured,
}

/// 远程列表一行的全部字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub path: String,
    pub size: u64,
    pub mtime: String,
    pub type_flag: String,
    pub mode: String,
    pub owner: String,
    pub description: String,
}

impl RemoteRecord {
    /// 解析一行结构化列表
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 7 {
            return Err(format!("需要 7 个字段，实际 {} 个", fields.len()));
        }

        let type_flag = fields[3];
        if !type_flag.contains('D') && !type_flag.contains('F') {
            return Err(format!("未知的类型标志: {}", type_flag));
        }

        Ok(Self {
            path: fields[0].trim_end_matches('/').to_string(),
            size: hex_size(fields[1])?,
            mtime: fields[2].to_string(),
            type_flag: type_flag.to_string(),
            mode: fields[4].to_string(),
            owner: fields[5].to_string(),
            // 第七个字段之后的内容都属于描述
            description: fields[6..].join(" "),
        })
    }

    pub fn kind(&self) -> EntryKind {
        if self.type_flag.contains('D') {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.type_flag.contains('h')
    }

    pub fn into_entry(self) -> Entry {
        Entry {
            kind: self.kind(),
            hidden: self.is_hidden(),
            size: self.size,
            path: self.path,
        }
    }
}

fn total_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^total\s+\S+$").expect("valid regex"))
}

/// 长格式记录开头的类型和权限位，如 `-rw-r--r--`
fn mode_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-bcdlpsD][rwxsStT-]{9}").expect("valid regex"))
}

/// 逐行解析器，保存本地列表的“当前目录”状态
#[derive(Debug)]
pub struct ListingParser {
    format: ListingFormat,
    current_dir: Option<String>,
    line_no: usize,
}

impl ListingParser {
    pub fn new(format: ListingFormat) -> Self {
        Self {
            format,
            current_dir: None,
            line_no: 0,
        }
    }

    pub fn format(&self) -> ListingFormat {
        self.format
    }

    /// 解析一行，返回该行产生的条目（可能没有）
    pub fn parse_line(&mut self, line: &str) -> Result<Option<Entry>> {
        self.line_no += 1;
        let line = line.trim_end_matches(['\r', '\n']);

        if line.trim().is_empty() {
            return Ok(None);
        }

        match self.format {
            ListingFormat::RemoteStructured => RemoteRecord::parse(line)
                .map(|r| Some(r.into_entry()))
                .map_err(|reason| SyncError::parse(self.line_no, reason)),
            ListingFormat::LocalRecursive => self.parse_local(line),
        }
    }

    fn parse_local(&mut self, line: &str) -> Result<Option<Entry>> {
        // 块头: "<path>:"；以冒号结尾的文件记录不是块头
        let header = line.strip_suffix(':').filter(|_| !mode_prefix().is_match(line));
        if let Some(dir) = header {
            let dir = match dir.trim_end_matches('/') {
                "" => "/",
                d => d,
            };
            trace!("进入目录: {}", dir);
            self.current_dir = Some(dir.to_string());
            return Ok(Some(Entry::directory(dir)));
        }

        if total_line().is_match(line) {
            return Ok(None);
        }

        // 目录详情行，目录本身由块头给出
        if line.starts_with('d') {
            return Ok(None);
        }

        // 符号链接记录以链接名为准
        let record = line.split(" -> ").next().unwrap_or(line);
        let fields: Vec<&str> = record.split_whitespace().collect();
        if fields.len() < 6 {
            return Err(SyncError::parse(self.line_no, format!("无法识别的文件记录: {}", line)));
        }

        // 设备文件在这一列是主设备号，按 0 处理
        let size = fields[4].parse::<u64>().unwrap_or_else(|_| {
            debug!("文件记录没有字节大小: {}", line);
            0
        });
        let name = fields[fields.len() - 1];

        let dir = self
            .current_dir
            .as_deref()
            .ok_or_else(|| SyncError::parse(self.line_no, "文件记录出现在任何目录块之前"))?;

        let path = if dir == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", dir, name)
        };

        Ok(Some(Entry::file(path, size)))
    }
}

/// 按列表顺序逐个产生条目的来源
#[async_trait]
pub trait EntrySource: Send {
    /// 下一个条目，`None` 表示列表结束
    async fn next_entry(&mut self) -> Result<Option<Entry>>;
}

/// 从任意异步行流读取条目
///
/// 按字节读取行，非 UTF-8 的文件名以替换字符解码，不会中断整个列表。
pub struct EntryReader<R> {
    reader: R,
    buf: Vec<u8>,
    parser: ListingParser,
}

impl<R: AsyncBufRead + Unpin> EntryReader<R> {
    pub fn new(reader: R, format: ListingFormat) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            parser: ListingParser::new(format),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EntrySource for EntryReader<R> {
    async fn next_entry(&mut self) -> Result<Option<Entry>> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }

            let line = String::from_utf8_lossy(&self.buf);
            if let Some(entry) = self.parser.parse_line(&line)? {
                return Ok(Some(entry));
            }
        }
    }
}

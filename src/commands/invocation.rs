//! 命令行调用的解析：识别选项、端点和运行模式

use crate::core::entry::TransferRoot;
use crate::error::{Result, SyncError};

const TOOL_PATH: &str = "--tool-path";

/// 运行模式，每次调用只决定一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 整个调用原样交给外部工具
    PassThrough,
    /// 本地目录 -> 远程，逐条续传
    UploadDirectoryResume,
    /// 远程目录 -> 本地，逐条续传
    DownloadDirectoryResume,
}

/// 识别出的单个参数
#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Recursive,
    Resume,
    /// 同时请求递归和续传的短选项组合，如 `-rc`
    RecursiveResume,
    Other,
}

fn classify(token: &str) -> Arg {
    match token {
        "-r" | "-R" | "--recursive" => return Arg::Recursive,
        "-c" | "--continue" | "--resume" => return Arg::Resume,
        _ => {}
    }

    // 只由 r/R/c 组成的短选项组合
    if let Some(cluster) = token.strip_prefix('-') {
        if cluster.len() > 1 && !cluster.starts_with('-') && cluster.chars().all(|c| "rRc".contains(c)) {
            let recursive = cluster.contains(['r', 'R']);
            let resume = cluster.contains('c');
            return match (recursive, resume) {
                (true, true) => Arg::RecursiveResume,
                (true, false) => Arg::Recursive,
                _ => Arg::Resume,
            };
        }
    }
    Arg::Other
}

/// 端点是否指向远程：第一个 `/` 之前有 `:`，且不是 Windows 盘符
pub fn parse_endpoint(value: &str) -> TransferRoot {
    let bytes = value.as_bytes();
    let drive_prefix = bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'\\' || bytes[2] == b'/');
    if drive_prefix {
        return TransferRoot::local(value);
    }

    match value.find(':') {
        Some(colon) if colon > 0 && value.find('/').map_or(true, |slash| colon < slash) => {
            let (server, path) = (&value[..colon], &value[colon + 1..]);
            // `host:` 表示远程默认目录
            let path = if path.is_empty() { "." } else { path };
            TransferRoot::remote(server, path)
        }
        _ => TransferRoot::local(value),
    }
}

/// 一次调用的类型化视图
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub recursive: bool,
    pub resume: bool,
    /// `--tool-path` 覆盖的工具路径
    pub tool_path: Option<String>,
    /// 透传模式下交给工具的参数（去掉了 `--tool-path`）
    pub forwarded: Vec<String>,
    /// 续传模式下每次传输附带的选项（不含端点和递归/续传选项）
    pub extra_options: Vec<String>,
    pub source: Option<TransferRoot>,
    pub dest: Option<TransferRoot>,
}

impl Invocation {
    /// 解析原始参数；最后两个值是源和目标端点
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut invocation = Invocation::default();
        let mut rest: Vec<(String, Arg)> = Vec::with_capacity(args.len());

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == TOOL_PATH {
                let value = iter
                    .next()
                    .ok_or_else(|| SyncError::Config(format!("{} 缺少参数值", TOOL_PATH)))?;
                invocation.tool_path = Some(value.clone());
                continue;
            }
            if let Some(value) = arg.strip_prefix("--tool-path=") {
                if value.is_empty() {
                    return Err(SyncError::Config(format!("{} 缺少参数值", TOOL_PATH)));
                }
                invocation.tool_path = Some(value.to_string());
                continue;
            }

            let kind = classify(arg);
            match kind {
                Arg::Recursive => invocation.recursive = true,
                Arg::Resume => invocation.resume = true,
                Arg::RecursiveResume => {
                    invocation.recursive = true;
                    invocation.resume = true;
                }
                Arg::Other => {}
            }
            invocation.forwarded.push(arg.clone());
            rest.push((arg.clone(), kind));
        }

        // 端点必须是最后两个未识别的值
        let tail_is_endpoints = rest.len() >= 2
            && rest[rest.len() - 2..]
                .iter()
                .all(|(value, kind)| *kind == Arg::Other && !value.starts_with('-'));
        if tail_is_endpoints {
            if let (Some((dest, _)), Some((source, _))) = (rest.pop(), rest.pop()) {
                invocation.source = Some(parse_endpoint(&source));
                invocation.dest = Some(parse_endpoint(&dest));
            }
        }

        invocation.extra_options = rest
            .into_iter()
            .filter(|(_, kind)| *kind == Arg::Other)
            .map(|(value, _)| value)
            .collect();

        Ok(invocation)
    }

    /// 模式决策表
    pub fn mode(&self) -> Mode {
        if !(self.recursive && self.resume) {
            return Mode::PassThrough;
        }
        match (&self.source, &self.dest) {
            (Some(source), Some(dest)) if source.is_remote() && !dest.is_remote() => {
                Mode::DownloadDirectoryResume
            }
            (Some(source), Some(dest)) if !source.is_remote() && dest.is_remote() => {
                Mode::UploadDirectoryResume
            }
            _ => Mode::PassThrough,
        }
    }
}

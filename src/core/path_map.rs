//! 源路径到目标路径的映射

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathMapError {
    /// 列表工具给出了源根之外的路径
    #[error("路径 {path} 不在源根 {root} 之下")]
    OutsideRoot { root: String, path: String },
}

/// 去掉结尾斜杠；`/` 变为空前缀
fn normalize_root(root: &str) -> &str {
    root.trim_end_matches('/')
}

/// 将 `path` 从源根的命名空间映射到目标根
pub fn map_path(source_root: &str, dest_root: &str, path: &str) -> Result<String, PathMapError> {
    let source = normalize_root(source_root);
    let dest = normalize_root(dest_root);
    let path = path.trim_end_matches('/');

    let suffix = path
        .strip_prefix(source)
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .ok_or_else(|| PathMapError::OutsideRoot {
            root: source_root.to_string(),
            path: path.to_string(),
        })?;

    let mapped = format!("{}{}", dest, suffix);
    if mapped.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(mapped)
    }
}

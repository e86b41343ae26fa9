//! # 原子文件写入
//!
//! 先写入同目录下的临时文件，再重命名到目标路径。读者只会看到旧文件或
//! 完整的新文件，进程中途崩溃也不会留下半截记录。
//!
//! ## 依赖关系
//! - 被 `models/energy.rs`, `distortions/metadata.rs`, `commands/` 使用
//! - 使用 `tempfile` crate

use crate::error::{Result, ShakeError};

use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// 原子写入文件；父目录不存在时自动创建
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let write_err = |e: std::io::Error| ShakeError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(content).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    Ok(())
}

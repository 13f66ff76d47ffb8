//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and
//! reduce duplicated `create_dir_all` / parent-directory checks.

use std::path::Path;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error(op, path, e))
}

/// Ensure the parent directory of a file path exists.
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    ensure_parent_dir_with_op("creating directory", path).await
}

/// Ensure the parent directory of a file path exists with a custom operation label.
pub async fn ensure_parent_dir_with_op(op: &'static str, path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    ensure_dir_all_with_op(op, parent).await
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Replace `path` with `contents` by writing a sibling temp file and renaming it over.
///
/// Readers never observe a half-written file.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir_with_op("creating parent directory", path).await?;

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| io_error("writing temp file", &tmp_path, e))?;

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(io_error("renaming temp file", path, e));
    }

    Ok(())
}

/// Check whether a path exists without following errors into a panic.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

//! Filesystem recording locks.
//!
//! `<creator_id>.lock` in the lock directory marks a creator as being
//! recorded. Creation is exclusive (`create_new`), so two sessions racing for
//! the same creator cannot both win. The guard removes the file when dropped.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::utils::{filename::sanitize_filename, fs};
use crate::{Error, Result};

const LOCK_EXTENSION: &str = "lock";

/// Directory holding recording locks.
#[derive(Debug, Clone)]
pub struct LockDir {
    dir: PathBuf,
}

impl LockDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_path(&self, creator_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{LOCK_EXTENSION}", sanitize_filename(creator_id)))
    }

    /// Try to take the lock for `creator_id`.
    ///
    /// `Ok(None)` means another session already holds it.
    pub async fn acquire(&self, creator_id: &str) -> Result<Option<RecordingLock>> {
        fs::ensure_dir_all_with_op("creating lock directory", &self.dir).await?;

        let path = self.lock_path(creator_id);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_file) => {
                debug!(creator_id = %creator_id, path = %path.display(), "Acquired recording lock");
                Ok(Some(RecordingLock { path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(Error::io_path("creating recording lock", &path, e)),
        }
    }

    pub async fn is_locked(&self, creator_id: &str) -> bool {
        fs::exists(&self.lock_path(creator_id)).await
    }

    /// Remove leftover lock files from a previous run.
    ///
    /// Only valid while no session of this process holds a lock.
    pub async fn clear_stale(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::io_path("reading lock directory", &self.dir, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io_path("reading lock directory", &self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOCK_EXTENSION) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale lock"),
            }
        }

        if removed > 0 {
            info!(count = removed, dir = %self.dir.display(), "Removed stale recording locks");
        }
        Ok(removed)
    }
}

/// Held recording lock; the lock file is removed on drop.
#[derive(Debug)]
pub struct RecordingLock {
    path: PathBuf,
}

impl RecordingLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RecordingLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Released recording lock"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to release recording lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_acquire_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path().join("locks"));

        let guard = locks.acquire("123").await.unwrap().expect("first acquire");
        assert!(guard.path().ends_with("123.lock"));
        assert!(locks.is_locked("123").await);
        assert!(locks.acquire("123").await.unwrap().is_none());

        drop(guard);
        assert!(!locks.is_locked("123").await);
        assert!(locks.acquire("123").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let locks = Arc::new(LockDir::new(dir.path()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                tokio::spawn(async move { locks.acquire("123").await.unwrap() })
            })
            .collect();

        let mut guards = Vec::new();
        for task in tasks {
            if let Some(guard) = task.await.unwrap() {
                guards.push(guard);
            }
        }
        assert_eq!(guards.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_stale_only_removes_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.lock"), b"").unwrap();
        std::fs::write(dir.path().join("2.lock"), b"").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"").unwrap();

        let locks = LockDir::new(dir.path());
        assert_eq!(locks.clear_stale().await.unwrap(), 2);
        assert!(dir.path().join("keep.txt").exists());
        assert!(!locks.is_locked("1").await);

        let missing = LockDir::new(dir.path().join("nope"));
        assert_eq!(missing.clear_stale().await.unwrap(), 0);
    }
}

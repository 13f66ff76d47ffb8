//! Merge-on-save persistence of chat logs.
//!
//! Each save reads the existing JSON array, appends the batch, sorts by
//! timestamp and atomically rewrites the whole file. Saves to the same
//! writer are serialized so overlapping flushes never lose messages.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::message::ChatMessage;
use crate::utils::fs;
use crate::{Error, Result};

pub struct ChatWriter {
    path: PathBuf,
    dedupe_by_id: bool,
    save_lock: Mutex<()>,
}

impl ChatWriter {
    pub fn new(path: impl Into<PathBuf>, dedupe_by_id: bool) -> Self {
        Self {
            path: path.into(),
            dedupe_by_id,
            save_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_existing(&self) -> Result<Vec<ChatMessage>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(messages) => Ok(messages),
                Err(e) => {
                    let backup = self.path.with_extension("json.corrupt");
                    warn!(
                        path = %self.path.display(),
                        backup = %backup.display(),
                        error = %e,
                        "Existing chat log is not valid JSON; moving it aside"
                    );
                    tokio::fs::rename(&self.path, &backup)
                        .await
                        .map_err(|e| Error::io_path("moving corrupt chat log", &self.path, e))?;
                    Ok(Vec::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::io_path("reading chat log", &self.path, e)),
        }
    }

    /// Merge `batch` into the file. Returns the number of messages on disk.
    pub async fn save(&self, batch: &[ChatMessage]) -> Result<usize> {
        let _guard = self.save_lock.lock().await;

        let mut messages = self.read_existing().await?;
        let incoming = batch.len();

        if self.dedupe_by_id {
            let mut seen: HashSet<String> = messages.iter().map(|m| m.id.clone()).collect();
            messages.extend(
                batch
                    .iter()
                    .filter(|m| m.id.is_empty() || seen.insert(m.id.clone()))
                    .cloned(),
            );
        } else {
            messages.extend_from_slice(batch);
        }

        messages.sort_by_key(|m| m.unix_timestamp_millis);

        let json = serde_json::to_vec_pretty(&messages)?;
        fs::write_atomic(&self.path, &json).await?;

        debug!(
            path = %self.path.display(),
            incoming,
            total = messages.len(),
            "Saved chat messages"
        );
        Ok(messages.len())
    }

    /// Write an empty JSON array if the file does not exist yet.
    pub async fn ensure_exists(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        if fs::exists(&self.path).await {
            return Ok(());
        }
        fs::write_atomic(&self.path, b"[]").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::ChatAuthor;
    use chrono::Utc;
    use std::sync::Arc;

    fn msg(id: &str, ts: i64) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            text: format!("text {id}"),
            message_type: 0,
            unix_timestamp_millis: ts,
            elapsed_seconds: 0,
            elapsed_text: "00:00:00".into(),
            author: ChatAuthor::default(),
            received_at: Utc::now(),
        }
    }

    fn read(path: &Path) -> Vec<ChatMessage> {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_save_merges_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ChatWriter::new(dir.path().join("rec_chat.json"), false);

        writer.save(&[msg("b", 20), msg("a", 10)]).await.unwrap();
        let total = writer.save(&[msg("c", 15), msg("a", 10)]).await.unwrap();

        assert_eq!(total, 4);
        let ts: Vec<i64> = read(writer.path())
            .iter()
            .map(|m| m.unix_timestamp_millis)
            .collect();
        assert_eq!(ts, vec![10, 10, 15, 20]);
    }

    #[tokio::test]
    async fn test_dedupe_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ChatWriter::new(dir.path().join("rec_chat.json"), true);

        writer.save(&[msg("a", 10)]).await.unwrap();
        let total = writer.save(&[msg("a", 10), msg("b", 5)]).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(read(writer.path())[0].id, "b");
    }

    #[tokio::test]
    async fn test_overlapping_saves_keep_union() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(ChatWriter::new(dir.path().join("rec_chat.json"), false));

        let first = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.save(&[msg("x", 30), msg("y", 10)]).await })
        };
        let second = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.save(&[msg("x", 30), msg("z", 20)]).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let messages = read(writer.path());
        assert_eq!(messages.len(), 4);
        assert!(
            messages
                .windows(2)
                .all(|w| w[0].unix_timestamp_millis <= w[1].unix_timestamp_millis)
        );
    }

    #[tokio::test]
    async fn test_ensure_exists_writes_empty_array_once() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ChatWriter::new(dir.path().join("rec_chat.json"), false);

        writer.ensure_exists().await.unwrap();
        assert_eq!(std::fs::read_to_string(writer.path()).unwrap(), "[]");

        writer.save(&[msg("a", 1)]).await.unwrap();
        writer.ensure_exists().await.unwrap();
        assert_eq!(read(writer.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec_chat.json");
        std::fs::write(&path, b"[{oops").unwrap();

        let writer = ChatWriter::new(&path, false);
        writer.save(&[msg("a", 1)]).await.unwrap();

        assert_eq!(read(&path).len(), 1);
        assert!(dir.path().join("rec_chat.json.corrupt").exists());
    }
}

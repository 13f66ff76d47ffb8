//! Durable creator-ID to display-name map.
//!
//! Stored as a flat JSON object and rewritten atomically on every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::utils::fs;
use crate::{Error, Result};

/// One watched creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchEntry {
    pub creator_id: String,
    pub display_name: String,
}

/// In-memory watch-list bound to its file.
#[derive(Debug)]
pub struct WatchList {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

/// Suffix appended to a watch-list file that failed to parse.
const CORRUPT_SUFFIX: &str = "corrupt";

type Entries = BTreeMap<String, String>;

async fn read_entries(path: &Path) -> Result<std::result::Result<Entries, serde_json::Error>> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Ok(Entries::new())),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Ok(Entries::new())),
        Err(e) => Err(Error::io_path("reading watch-list", path, e)),
    }
}

impl WatchList {
    /// Load from `path`. A missing file is an empty list. A corrupt file is
    /// moved aside to `<name>.corrupt` and the list starts empty, so the
    /// next save cannot overwrite the user's entries.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match read_entries(&path).await? {
            Ok(entries) => entries,
            Err(e) => {
                let backup = Self::backup_path(&path);
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "Watch-list is not valid JSON; moving it aside and starting empty"
                );
                tokio::fs::rename(&path, &backup)
                    .await
                    .map_err(|e| Error::io_path("moving corrupt watch-list", &path, e))?;
                Entries::new()
            }
        };

        debug!(path = %path.display(), count = entries.len(), "Loaded watch-list");
        Ok(Self { path, entries })
    }

    /// Replace the in-memory entries with the file's current contents.
    ///
    /// A corrupt file is an error and leaves both the entries and the file
    /// untouched.
    pub async fn reload(&mut self) -> Result<()> {
        match read_entries(&self.path).await? {
            Ok(entries) => {
                self.entries = entries;
                Ok(())
            }
            Err(e) => Err(Error::config(format!(
                "watch-list {} is not valid JSON: {e}",
                self.path.display()
            ))),
        }
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(CORRUPT_SUFFIX);
        PathBuf::from(name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, creator_id: &str) -> bool {
        self.entries.contains_key(creator_id)
    }

    pub fn display_name(&self, creator_id: &str) -> Option<&str> {
        self.entries.get(creator_id).map(String::as_str)
    }

    pub fn insert(&mut self, creator_id: &str, display_name: &str) {
        self.entries
            .insert(creator_id.to_string(), display_name.to_string());
    }

    pub fn remove(&mut self, creator_id: &str) -> Option<String> {
        self.entries.remove(creator_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<WatchEntry> {
        self.entries
            .iter()
            .map(|(id, name)| WatchEntry {
                creator_id: id.clone(),
                display_name: name.clone(),
            })
            .collect()
    }

    /// Write the whole list atomically (temp file + rename), mode 0644 on Unix.
    pub async fn persist(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.entries)?;
        fs::write_atomic(&self.path, &json).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o644))
                .await
                .map_err(|e| Error::io_path("setting watch-list permissions", &self.path, e))?;
        }

        debug!(path = %self.path.display(), count = self.entries.len(), "Persisted watch-list");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = WatchList::load(dir.path().join("state.json")).await.unwrap();
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn test_persist_round_trip_as_flat_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut list = WatchList::load(&path).await.unwrap();
        list.insert("123", "alice");
        list.insert("456", "bob");
        list.persist().await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["123"], "alice");
        assert_eq!(raw["456"], "bob");

        let reloaded = WatchList::load(&path).await.unwrap();
        assert_eq!(reloaded.entries(), list.entries());
        assert_eq!(reloaded.display_name("123"), Some("alice"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_persist_sets_mode_0644() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut list = WatchList::load(&path).await.unwrap();
        list.insert("1", "a");
        list.persist().await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let original = br#"{"111":"carol","222":"dave",}"#;
        std::fs::write(&path, original).unwrap();

        let mut list = WatchList::load(&path).await.unwrap();
        assert!(list.is_empty());

        list.insert("123", "alice");
        list.persist().await.unwrap();

        let backup = dir.path().join("state.json.corrupt");
        assert_eq!(std::fs::read(&backup).unwrap(), original);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("123"));
        assert!(!raw.contains("111"));
    }

    #[tokio::test]
    async fn test_reload_picks_up_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut list = WatchList::load(&path).await.unwrap();
        list.insert("123", "alice");
        list.persist().await.unwrap();

        let mut other = WatchList::load(&path).await.unwrap();
        other.remove("123");
        other.insert("456", "bob");
        other.persist().await.unwrap();

        list.reload().await.unwrap();
        assert!(!list.contains("123"));
        assert_eq!(list.display_name("456"), Some("bob"));
    }

    #[tokio::test]
    async fn test_reload_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut list = WatchList::load(&path).await.unwrap();
        list.insert("123", "alice");
        list.persist().await.unwrap();

        std::fs::write(&path, b"{\"123\":").unwrap();
        assert!(matches!(list.reload().await, Err(Error::Configuration(_))));
        assert!(list.contains("123"));
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"123\":");
    }
}

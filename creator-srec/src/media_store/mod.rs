//! Content-addressed registry of recorded files.
//!
//! The recorder registers every finished livestream and contact sheet here by
//! SHA-256 hash. The SQLite implementation keeps one row per hash; saving a
//! hash that is already known is a no-op.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

use crate::Result;

/// Database connection pool type alias.
pub type DbPool = Pool<Sqlite>;

const DEFAULT_POOL_SIZE: u32 = 4;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// Kind of file produced by a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedKind {
    Livestream,
    ContactSheet,
}

impl RecordedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Livestream => "livestream",
            Self::ContactSheet => "contact_sheet",
        }
    }
}

impl fmt::Display for RecordedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished output file, created once post-processing succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedFile {
    pub creator_name: String,
    pub content_hash: String,
    pub path: PathBuf,
    pub kind: RecordedKind,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Whether a file with this content hash is already registered.
    async fn exists(&self, content_hash: &str) -> Result<bool>;

    /// Register a file. Returns `false` when the hash was already known.
    async fn save(&self, file: &RecordedFile) -> Result<bool>;
}

/// Initialize the SQLite pool with WAL mode.
pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(DEFAULT_POOL_SIZE)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options)
        .await?;

    info!(
        "Database pool initialized with WAL mode, {} max connections",
        DEFAULT_POOL_SIZE
    );
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations completed");
    Ok(())
}

/// SQLite-backed [`MediaStore`].
#[derive(Clone)]
pub struct SqliteMediaStore {
    pool: DbPool,
}

impl SqliteMediaStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) and migrate the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = init_pool(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    /// All files registered for a creator, oldest first.
    pub async fn list_by_creator(&self, creator_name: &str) -> Result<Vec<RecordedFile>> {
        let rows = sqlx::query(
            "SELECT creator_name, content_hash, path, kind FROM recorded_files \
             WHERE creator_name = ? ORDER BY id",
        )
        .bind(creator_name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<RecordedFile> {
                let kind: String = row.try_get("kind")?;
                let kind = match kind.as_str() {
                    "contact_sheet" => RecordedKind::ContactSheet,
                    _ => RecordedKind::Livestream,
                };
                let path: String = row.try_get("path")?;
                Ok(RecordedFile {
                    creator_name: row.try_get("creator_name")?,
                    content_hash: row.try_get("content_hash")?,
                    path: PathBuf::from(path),
                    kind,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MediaStore for SqliteMediaStore {
    async fn exists(&self, content_hash: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM recorded_files WHERE content_hash = ? LIMIT 1")
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn save(&self, file: &RecordedFile) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO recorded_files (creator_name, content_hash, path, kind, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&file.creator_name)
        .bind(&file.content_hash)
        .bind(file.path.to_string_lossy().as_ref())
        .bind(file.kind.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        debug!(
            creator = %file.creator_name,
            hash = %file.content_hash,
            kind = %file.kind,
            inserted,
            "Registered recorded file"
        );
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, SqliteMediaStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("media.db").display());
        let store = SqliteMediaStore::connect(&url).await.unwrap();
        (dir, store)
    }

    fn file(hash: &str, kind: RecordedKind) -> RecordedFile {
        RecordedFile {
            creator_name: "alice".into(),
            content_hash: hash.into(),
            path: PathBuf::from(format!("/data/alice/Livestreams/{hash}.mp4")),
            kind,
        }
    }

    #[tokio::test]
    async fn test_save_and_exists() {
        let (_dir, store) = store().await;
        assert!(!store.exists("abc").await.unwrap());

        assert!(store.save(&file("abc", RecordedKind::Livestream)).await.unwrap());
        assert!(store.exists("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_hash_is_ignored() {
        let (_dir, store) = store().await;
        assert!(store.save(&file("abc", RecordedKind::Livestream)).await.unwrap());
        assert!(!store.save(&file("abc", RecordedKind::Livestream)).await.unwrap());
        assert!(store.save(&file("def", RecordedKind::ContactSheet)).await.unwrap());

        let files = store.list_by_creator("alice").await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].kind, RecordedKind::ContactSheet);
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&RecordedKind::ContactSheet).unwrap(),
            "\"contact_sheet\""
        );
        assert_eq!(RecordedKind::Livestream.to_string(), "livestream");
    }
}

//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// IO error annotated with the operation and the path it touched.
    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    pub fn chat(msg: impl Into<String>) -> Self {
        Self::Chat(msg.into())
    }

    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Self::TaskFailed(format!("task panicked: {err}"))
        } else {
            Self::TaskFailed(format!("task cancelled: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_path_display_includes_context() {
        let err = Error::io_path(
            "creating lock",
            Path::new("/tmp/locks/123.lock"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("creating lock"));
        assert!(msg.contains("123.lock"));
    }

    #[tokio::test]
    async fn test_join_error_panic_is_task_failed() {
        let handle = tokio::spawn(async { panic!("boom") });
        let err: Error = handle.await.unwrap_err().into();
        assert!(matches!(err, Error::TaskFailed(ref m) if m.contains("panicked")));
    }
}

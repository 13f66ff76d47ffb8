//! Logging setup: console plus daily-rolling file output with local timestamps.
//!
//! This module provides:
//! - An `EnvFilter` defaulting to [`DEFAULT_LOG_FILTER`] (overridable via `RUST_LOG`)
//! - A non-blocking daily file appender under the state directory
//! - Log file retention cleanup (deletes logs older than 7 days)

use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::fs;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "creator_srec=info,sqlx=warn";

/// Prefix of the rolling log files (`creator-srec.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "creator-srec.log";

/// Log retention period in days.
const LOG_RETENTION_DAYS: i64 = 7;

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Handle to the installed logging setup.
pub struct LoggingConfig {
    log_dir: PathBuf,
}

impl LoggingConfig {
    /// Get the log directory path.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Start the log retention cleanup task.
    ///
    /// Runs once at startup and then daily.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel_token: CancellationToken) {
        let log_dir = self.log_dir.clone();

        tokio::spawn(async move {
            let cleanup_interval = Duration::from_secs(24 * 60 * 60);

            loop {
                let today = Local::now().date_naive();
                if let Err(e) = cleanup_old_logs(&log_dir, today, LOG_RETENTION_DAYS).await {
                    warn!(error = %e, "Failed to cleanup old logs");
                }

                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Log retention cleanup task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(cleanup_interval) => {}
                }
            }
        });
    }
}

/// Delete rolling log files dated more than `retention_days` before `today`.
async fn cleanup_old_logs(
    log_dir: &Path,
    today: NaiveDate,
    retention_days: i64,
) -> std::io::Result<usize> {
    let cutoff = today - chrono::Duration::days(retention_days);

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;
    let prefix = format!("{LOG_FILE_PREFIX}.");

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(date_str) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|name| name.strip_prefix(&prefix))
        else {
            continue;
        };

        let Ok(file_date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };

        if file_date < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

/// Initialize console and file logging.
///
/// Returns the logging handle and the appender guard; keep the guard alive
/// for the lifetime of the application or buffered lines are lost.
pub fn init_logging(log_dir: &Path) -> crate::Result<(Arc<LoggingConfig>, WorkerGuard)> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    let config = Arc::new(LoggingConfig {
        log_dir: log_dir.to_path_buf(),
    });

    Ok((config, guard))
}

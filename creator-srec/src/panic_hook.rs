//! Panic reporting.
//!
//! Panics inside recorder and chat tasks surface to their supervisors as
//! `JoinError`s, which keeps the daemon running but loses the message and
//! location. The hook logs both through `tracing` and appends them to
//! `panics.log` in the log directory, which log retention leaves alone.

use std::backtrace::Backtrace;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic::{PanicHookInfo, take_hook};
use std::path::Path;
use std::thread;

use chrono::Local;

/// File (inside the log directory) collecting panic records.
pub const PANIC_LOG_FILE: &str = "panics.log";

/// Install the hook, keeping the previously installed one chained after it.
pub fn install(log_dir: impl AsRef<Path>) {
    let panic_log = log_dir.as_ref().join(PANIC_LOG_FILE);
    let previous_hook = take_hook();

    std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let record = PanicRecord::capture(info);

            tracing::error!(
                target: "creator_srec::panic",
                thread = %record.thread,
                location = %record.location,
                "Panic: {}",
                record.message
            );

            if let Err(e) = record.append_to(&panic_log) {
                tracing::warn!(path = %panic_log.display(), error = %e, "Failed to write panic record");
            }
        }));

        previous_hook(info);
    }));
}

#[derive(Debug)]
struct PanicRecord {
    timestamp: String,
    thread: String,
    location: String,
    message: String,
    backtrace: String,
}

impl PanicRecord {
    fn capture(info: &PanicHookInfo<'_>) -> Self {
        let location = info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "<unknown>".to_string());

        let message = if let Some(s) = info.payload().downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            info.to_string()
        };

        Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string(),
            thread: thread::current().name().unwrap_or("<unnamed>").to_string(),
            location,
            message,
            backtrace: Backtrace::capture().to_string(),
        }
    }

    fn render(&self) -> String {
        format!(
            "{} PANIC thread={} location={} message={}\n{}\n",
            self.timestamp, self.thread, self.location, self.message, self.backtrace
        )
    }

    fn append_to(&self, path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(self.render().as_bytes())?;
        file.flush()
    }
}

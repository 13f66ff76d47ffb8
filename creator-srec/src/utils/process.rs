//! Child process helpers for the external media tools.
//!
//! Provides command construction (no console window on Windows), a
//! cancellation-aware waiter for long-running captures, and a run-to-exit
//! helper for short post-processing tools.

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{Error, Result};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Number of trailing stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn tokio_command(program: impl AsRef<OsStr>) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(windows)]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd.kill_on_drop(true);
    cmd
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process exited by itself with this code (`None` when killed by a signal).
    Exited(Option<i32>),
    /// The stop signal fired first and the process was killed.
    Cancelled,
}

impl ProcessExit {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessExit::Exited(Some(0)))
    }
}

/// Wait for `child` to exit, or kill it as soon as `cancellation_token` fires.
///
/// Whichever happens first wins. A cancelled process is reaped before this
/// returns so the output file is closed by the time the caller inspects it.
pub async fn wait_or_kill(mut child: Child, cancellation_token: CancellationToken) -> ProcessExit {
    tokio::select! {
        _ = cancellation_token.cancelled() => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill process: {}", e);
            }
            ProcessExit::Cancelled
        }
        status = child.wait() => {
            match status {
                Ok(exit_status) => {
                    let code = exit_status.code();
                    if let Some(c) = code
                        && c != 0
                    {
                        warn!("Process exited with code: {}", c);
                    }
                    ProcessExit::Exited(code)
                }
                Err(e) => {
                    error!("Error waiting for process: {}", e);
                    ProcessExit::Exited(Some(-1))
                }
            }
        }
    }
}

/// Run a command to completion, logging its stderr at debug level.
///
/// Returns the exit status together with the last few stderr lines so
/// failures can be reported with context.
pub async fn run_to_exit(command: &mut Command) -> Result<(ExitStatus, Vec<String>)> {
    command.stdout(Stdio::null());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| Error::process(format!("Failed to spawn command: {}", e)))?;

    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut tail = Vec::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("stderr: {}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.remove(0);
                }
                tail.push(line);
            }
            tail
        })
    });

    let status = child
        .wait()
        .await
        .map_err(|e| Error::process(format!("Failed to wait for command: {}", e)))?;

    let tail = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    Ok((status, tail))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_or_kill_reports_exit_code() {
        let child = tokio_command("sh")
            .args(["-c", "exit 3"])
            .spawn()
            .unwrap();
        let exit = wait_or_kill(child, CancellationToken::new()).await;
        assert_eq!(exit, ProcessExit::Exited(Some(3)));
        assert!(!exit.is_success());
    }

    #[tokio::test]
    async fn test_wait_or_kill_cancels_long_running_process() {
        let child = tokio_command("sleep").arg("30").spawn().unwrap();
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let exit = tokio::time::timeout(Duration::from_secs(5), wait_or_kill(child, token))
            .await
            .expect("process should be killed promptly");
        assert_eq!(exit, ProcessExit::Cancelled);
    }

    #[tokio::test]
    async fn test_run_to_exit_collects_stderr_tail() {
        let mut cmd = tokio_command("sh");
        cmd.args(["-c", "echo first >&2; echo second >&2; exit 1"]);
        let (status, tail) = run_to_exit(&mut cmd).await.unwrap();
        assert!(!status.success());
        assert_eq!(tail, vec!["first".to_string(), "second".to_string()]);
    }
}

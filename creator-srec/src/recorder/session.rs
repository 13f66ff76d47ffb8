//! Recording sessions.
//!
//! A session takes the creator's recording lock, re-checks the stream,
//! captures it until it ends or is cancelled, then hands the capture to
//! post-processing. The lock is held for the whole session and released on
//! every exit path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use super::engine::{CaptureRequest, MediaEngine};
use super::lock::LockDir;
use super::postprocess::PostProcessor;
use crate::api::LiveProber;
use crate::chat::{ChatService, ChatSessionParams};
use crate::config::AppConfig;
use crate::media_store::MediaStore;
use crate::monitor::Registry;
use crate::notification::Notifier;
use crate::utils::filename::{RecordingPaths, TemplateContext};
use crate::utils::fs;

/// How a recording session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Another session holds the creator's lock.
    AlreadyRecording,
    /// The stream was no longer live (or had no playback URL) when re-checked.
    NotLive,
    /// The session could not start (lock, probe or path error).
    Aborted(String),
    /// Capture ended without producing a file.
    NoOutput,
    Completed {
        final_file: PathBuf,
        contact_sheet: Option<PathBuf>,
    },
}

/// Who to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingRequest {
    pub creator_id: String,
    pub creator_name: String,
}

/// Collaborators shared by all recording sessions.
#[derive(Clone)]
pub struct RecorderDeps {
    pub prober: Arc<dyn LiveProber>,
    pub engine: Arc<dyn MediaEngine>,
    pub store: Arc<dyn MediaStore>,
    pub notifier: Notifier,
    pub chat: Arc<ChatService>,
    pub locks: LockDir,
}

const STOPPED_BEFORE_CAPTURE: &str = "stopped before capture started";

/// Keeps a session's stop token in the active registry until dropped.
struct ActiveSession<'a> {
    registry: &'a Registry<String, CancellationToken>,
    creator_id: &'a str,
}

impl<'a> ActiveSession<'a> {
    fn register(
        registry: &'a Registry<String, CancellationToken>,
        creator_id: &'a str,
        token: CancellationToken,
    ) -> Self {
        registry.add(creator_id.to_string(), token);
        Self {
            registry,
            creator_id,
        }
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.creator_id);
    }
}

/// Runs recording sessions and tracks the ones in flight.
pub struct Recorder {
    deps: RecorderDeps,
    active: Registry<String, CancellationToken>,
    tracker: TaskTracker,
    shutdown_token: CancellationToken,
}

impl Recorder {
    pub fn new(deps: RecorderDeps) -> Self {
        Self {
            deps,
            active: Registry::new(),
            tracker: TaskTracker::new(),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn locks(&self) -> &LockDir {
        &self.deps.locks
    }

    pub fn chat(&self) -> &Arc<ChatService> {
        &self.deps.chat
    }

    pub fn notifier(&self) -> &Notifier {
        &self.deps.notifier
    }

    /// Whether a session holding the creator's lock is running.
    pub fn is_recording(&self, creator_id: &str) -> bool {
        self.active.contains(creator_id)
    }

    pub fn active_recordings(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.snapshot().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        ids
    }

    /// Run a session on a tracked background task.
    pub fn spawn(
        self: &Arc<Self>,
        request: RecordingRequest,
        config: Arc<AppConfig>,
    ) -> JoinHandle<SessionOutcome> {
        let this = self.clone();
        self.tracker.spawn(async move {
            let outcome = this.record(&request, &config).await;
            info!(creator_id = %request.creator_id, ?outcome, "Recording session ended");
            outcome
        })
    }

    /// Run one recording session to completion.
    pub async fn record(&self, request: &RecordingRequest, config: &AppConfig) -> SessionOutcome {
        let creator_id = request.creator_id.as_str();
        let creator_name = request.creator_name.as_str();

        let _lock = match self.deps.locks.acquire(creator_id).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                info!(creator_id = %creator_id, "Already recording; skipping");
                return SessionOutcome::AlreadyRecording;
            }
            Err(e) => {
                error!(creator_id = %creator_id, error = %e, "Failed to acquire recording lock");
                return SessionOutcome::Aborted(e.to_string());
            }
        };

        // Registered while the lock is held so a stop issued before the
        // capture starts is not lost.
        let cancel = self.shutdown_token.child_token();
        let active = ActiveSession::register(&self.active, creator_id, cancel.clone());

        let status = match self.deps.prober.check_live(creator_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(creator_id = %creator_id, error = %e, "Failed to refresh stream metadata");
                return SessionOutcome::Aborted(e.to_string());
            }
        };
        let playback_url = match status.playback_url.as_deref() {
            Some(url) if status.is_live => url.to_string(),
            _ => {
                info!(creator_id = %creator_id, "Stream is not live anymore");
                return SessionOutcome::NotLive;
            }
        };

        let stream_id = status.stream_id.clone().unwrap_or_default();
        let version = status
            .stream_version
            .map(|v| v.to_string())
            .unwrap_or_default();
        let paths = RecordingPaths::resolve(
            &config.paths.save_location,
            &config.livestream.filename_template,
            &TemplateContext {
                creator: creator_name,
                creator_id,
                stream_id: &stream_id,
                version: &version,
                started_at: Local::now(),
            },
        );
        if let Err(e) = fs::ensure_parent_dir_with_op("creating recording directory", &paths.capture).await {
            error!(creator_id = %creator_id, error = %e, "Cannot prepare output directory");
            return SessionOutcome::Aborted(e.to_string());
        }

        if cancel.is_cancelled() {
            info!(creator_id = %creator_id, "Recording stopped before capture started");
            return SessionOutcome::Aborted(STOPPED_BEFORE_CAPTURE.to_string());
        }

        let chat = match status.chat_room_id.as_deref() {
            Some(room) if config.livestream.record_chat => {
                let session = self.deps.chat.start_session(ChatSessionParams {
                    creator_id: creator_id.to_string(),
                    display_name: creator_name.to_string(),
                    chat_room_id: room.to_string(),
                    output: paths.chat.clone(),
                });
                if session.is_none() {
                    warn!(creator_id = %creator_id, "Chat capture already active; not starting another");
                }
                session
            }
            _ => None,
        };

        let capture_request = CaptureRequest {
            creator_id: creator_id.to_string(),
            playback_url,
            output: paths.capture.clone(),
            user_agent: Some(config.account.user_agent.clone()),
        };
        if cancel.is_cancelled() {
            info!(creator_id = %creator_id, "Recording stopped before capture started");
        } else {
            match self.deps.engine.capture(&capture_request, cancel).await {
                Ok(exit) => info!(creator_id = %creator_id, ?exit, "Capture ended"),
                Err(e) => error!(creator_id = %creator_id, error = %e, "Capture failed"),
            }
        }
        drop(active);

        PostProcessor {
            engine: self.deps.engine.as_ref(),
            store: self.deps.store.as_ref(),
            notifier: &self.deps.notifier,
            settings: &config.livestream,
            creator_id,
            creator_name,
        }
        .run(
            &paths.capture,
            chat.map(|session| (self.deps.chat.as_ref(), session)),
        )
        .await
    }

    /// Cancel the creator's session, if any. A session stopped before its
    /// capture starts ends without capturing.
    pub fn stop(&self, creator_id: &str) -> bool {
        match self.active.get(creator_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal every capture to stop, then give post-processing `grace` to run.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown_token.cancel();
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "Recording sessions still finishing after grace period"
            );
        }
    }
}

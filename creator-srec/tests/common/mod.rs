//! Fakes for the recorder's collaborators, shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use creator_srec::api::{LiveProber, LiveStatus};
use creator_srec::chat::protocol::{Frame, frame_type};
use creator_srec::chat::{ChatConnection, ChatService, ChatSettings, ChatTransport};
use creator_srec::config::{AppConfig, ChatTimings};
use creator_srec::media_store::{MediaStore, RecordedFile};
use creator_srec::notification::{NotificationEvent, NotificationSink, Notifier};
use creator_srec::recorder::{CaptureRequest, LockDir, MediaEngine, Recorder, RecorderDeps};
use creator_srec::utils::process::ProcessExit;
use creator_srec::{Error, Result};

pub fn live(url: &str, room: &str) -> LiveStatus {
    LiveStatus {
        is_live: true,
        playback_url: Some(url.to_string()),
        chat_room_id: Some(room.to_string()),
        stream_id: Some("s-1".to_string()),
        stream_version: Some(3),
    }
}

#[derive(Default)]
pub struct FakeProber {
    statuses: Mutex<HashMap<String, LiveStatus>>,
    calls: AtomicUsize,
    hold: Mutex<Option<CancellationToken>>,
}

impl FakeProber {
    pub fn set(&self, creator_id: &str, status: LiveStatus) {
        self.statuses.lock().insert(creator_id.to_string(), status);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Block every check until `release` is cancelled.
    pub fn hold_until(&self, release: CancellationToken) {
        *self.hold.lock() = Some(release);
    }
}

#[async_trait]
impl LiveProber for FakeProber {
    async fn check_live(&self, creator_id: &str) -> Result<LiveStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().clone();
        if let Some(release) = hold {
            release.cancelled().await;
        }
        Ok(self
            .statuses
            .lock()
            .get(creator_id)
            .cloned()
            .unwrap_or_else(LiveStatus::offline))
    }
}

/// Writes a small capture file; optionally blocks until released or cancelled.
pub struct FakeEngine {
    pub lock_dir: PathBuf,
    pub captures: Mutex<Vec<CaptureRequest>>,
    /// Whether the creator's lock file existed while capturing.
    pub lock_seen: Mutex<Vec<bool>>,
    pub sheet_sources: Mutex<Vec<PathBuf>>,
    pub fail_convert: bool,
    pub hold: Option<CancellationToken>,
}

impl FakeEngine {
    pub fn new(lock_dir: &Path) -> Self {
        Self {
            lock_dir: lock_dir.to_path_buf(),
            captures: Mutex::new(Vec::new()),
            lock_seen: Mutex::new(Vec::new()),
            sheet_sources: Mutex::new(Vec::new()),
            fail_convert: false,
            hold: None,
        }
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn capture(
        &self,
        request: &CaptureRequest,
        cancellation_token: CancellationToken,
    ) -> Result<ProcessExit> {
        self.captures.lock().push(request.clone());
        let lock_path = self.lock_dir.join(format!("{}.lock", request.creator_id));
        self.lock_seen.lock().push(lock_path.exists());

        tokio::fs::write(&request.output, b"captured-bytes").await?;

        if let Some(hold) = &self.hold {
            tokio::select! {
                _ = hold.cancelled() => {}
                _ = cancellation_token.cancelled() => return Ok(ProcessExit::Cancelled),
            }
        }
        Ok(ProcessExit::Exited(Some(0)))
    }

    async fn convert(&self, source: &Path, destination: &Path) -> Result<()> {
        if self.fail_convert {
            tokio::fs::write(destination, b"partial").await?;
            return Err(Error::process("ffmpeg exited with status 1"));
        }
        let bytes = tokio::fs::read(source).await?;
        tokio::fs::write(destination, [bytes.as_slice(), b"-mp4"].concat()).await?;
        Ok(())
    }

    async fn contact_sheet(&self, source: &Path, destination: &Path) -> Result<()> {
        self.sheet_sources.lock().push(source.to_path_buf());
        if !source.exists() {
            return Err(Error::process("source does not exist"));
        }
        tokio::fs::write(destination, b"jpeg").await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub files: Mutex<Vec<RecordedFile>>,
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn exists(&self, content_hash: &str) -> Result<bool> {
        Ok(self
            .files
            .lock()
            .iter()
            .any(|f| f.content_hash == content_hash))
    }

    async fn save(&self, file: &RecordedFile) -> Result<bool> {
        let mut files = self.files.lock();
        if files.iter().any(|f| f.content_hash == file.content_hash) {
            return Ok(false);
        }
        files.push(file.clone());
        Ok(true)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingSink {
    pub fn types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.event_type()).collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

pub fn auth_ok_frame() -> String {
    Frame::new(frame_type::AUTH, &json!({ "session": { "id": "s1" } })).encode()
}

pub fn auth_rejected_frame() -> String {
    Frame::new(frame_type::ERROR, &json!({ "code": 401 })).encode()
}

/// How a scripted chat connection answers the auth frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthBehavior {
    Accept,
    Reject,
    /// Accept, then panic on the next read.
    AcceptThenPanic,
}

struct ScriptedConnection {
    auth_reply: Option<String>,
    panic_after_auth: bool,
}

#[async_trait]
impl ChatConnection for ScriptedConnection {
    async fn send_text(&mut self, _text: String) -> Result<()> {
        Ok(())
    }

    async fn recv_text(&mut self) -> Result<Option<String>> {
        match self.auth_reply.take() {
            Some(reply) => Ok(Some(reply)),
            None if self.panic_after_auth => panic!("chat connection crashed while reading"),
            None => std::future::pending::<Result<Option<String>>>().await,
        }
    }

    async fn close(&mut self) {}
}

/// Chat transport whose connections answer auth the same way every time.
pub struct ScriptedTransport {
    behavior: AuthBehavior,
    refuse_connect: bool,
    pub connects: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    pub fn new(behavior: AuthBehavior) -> Self {
        Self {
            behavior,
            refuse_connect: false,
            connects: Mutex::new(Vec::new()),
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse_connect: true,
            ..Self::new(AuthBehavior::Reject)
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn connect(&self, _url: &str) -> Result<Box<dyn ChatConnection>> {
        self.connects.lock().push(Instant::now());
        if self.refuse_connect {
            return Err(Error::chat("connection refused"));
        }
        let auth_reply = match self.behavior {
            AuthBehavior::Accept | AuthBehavior::AcceptThenPanic => auth_ok_frame(),
            AuthBehavior::Reject => auth_rejected_frame(),
        };
        Ok(Box::new(ScriptedConnection {
            auth_reply: Some(auth_reply),
            panic_after_auth: self.behavior == AuthBehavior::AcceptThenPanic,
        }))
    }
}

pub fn chat_settings() -> ChatSettings {
    ChatSettings {
        ws_url: "wss://chat.test/?v=3".to_string(),
        token: "test-token".to_string(),
        timings: ChatTimings::default(),
        dedupe_by_id: false,
    }
}

pub fn test_config(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.account.token = "test-token".to_string();
    config.paths.save_location = root.join("downloads");
    config.paths.state_dir = root.join("state");
    config
}

/// A recorder wired to fakes, with handles to inspect them.
pub struct Harness {
    pub config: Arc<AppConfig>,
    pub prober: Arc<FakeProber>,
    pub engine: Arc<FakeEngine>,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub transport: Arc<ScriptedTransport>,
    pub recorder: Arc<Recorder>,
}

impl Harness {
    pub fn new(config: AppConfig, engine: impl FnOnce(FakeEngine) -> FakeEngine) -> Self {
        let config = Arc::new(config);
        let lock_dir = config.paths.lock_dir();
        let prober = Arc::new(FakeProber::default());
        let engine = Arc::new(engine(FakeEngine::new(&lock_dir)));
        let store = Arc::new(MemoryStore::default());
        let sink = Arc::new(RecordingSink::default());
        let transport = Arc::new(ScriptedTransport::new(AuthBehavior::Accept));
        let chat = Arc::new(ChatService::new(chat_settings(), transport.clone()));

        let recorder = Arc::new(Recorder::new(RecorderDeps {
            prober: prober.clone(),
            engine: engine.clone(),
            store: store.clone(),
            notifier: Notifier::new(sink.clone()),
            chat,
            locks: LockDir::new(lock_dir),
        }));

        Self {
            config,
            prober,
            engine,
            store,
            sink,
            transport,
            recorder,
        }
    }

    pub fn lock_path(&self, creator_id: &str) -> PathBuf {
        self.recorder.locks().lock_path(creator_id)
    }
}

/// Let spawned fire-and-forget tasks (notifications) run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

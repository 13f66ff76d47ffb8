//! Chat capture session.
//!
//! One session follows one creator's chat room for the duration of a
//! recording. A supervisor task runs connection cycles
//! (connect, authenticate, join, stream) and restarts a failed cycle after a
//! fixed backoff for as long as the session should be running. Received
//! messages are buffered and merged into the chat log on a timer, when the
//! buffer fills up, and on stop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::message::ChatMessage;
use super::protocol::{self, AuthReply, Frame, frame_type};
use super::transport::{ChatConnection, ChatTransport};
use super::writer::ChatWriter;
use crate::config::ChatTimings;
use crate::{Error, Result};

/// Connection settings shared by all sessions.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub ws_url: String,
    pub token: String,
    pub timings: ChatTimings,
    pub dedupe_by_id: bool,
}

/// Per-session identity and output.
#[derive(Debug, Clone)]
pub struct ChatSessionParams {
    pub creator_id: String,
    pub display_name: String,
    pub chat_room_id: String,
    pub output: PathBuf,
}

pub struct ChatCaptureSession {
    creator_id: String,
    display_name: String,
    chat_room_id: String,
    settings: ChatSettings,
    transport: Arc<dyn ChatTransport>,
    writer: ChatWriter,
    start_time: DateTime<Utc>,

    pending: Mutex<Vec<ChatMessage>>,
    /// Whether the supervisor should keep reconnecting.
    running: parking_lot::Mutex<bool>,
    stop_token: CancellationToken,
    supervisor: parking_lot::Mutex<Option<JoinHandle<()>>>,
    current_cycle: parking_lot::Mutex<Option<AbortHandle>>,
    connect_cycles: AtomicU32,
}

impl ChatCaptureSession {
    pub fn new(
        params: ChatSessionParams,
        settings: ChatSettings,
        transport: Arc<dyn ChatTransport>,
    ) -> Arc<Self> {
        let writer = ChatWriter::new(params.output, settings.dedupe_by_id);
        let capacity = settings.timings.flush_threshold;

        Arc::new(Self {
            creator_id: params.creator_id,
            display_name: params.display_name,
            chat_room_id: params.chat_room_id,
            settings,
            transport,
            writer,
            start_time: Utc::now(),
            pending: Mutex::new(Vec::with_capacity(capacity)),
            running: parking_lot::Mutex::new(false),
            stop_token: CancellationToken::new(),
            supervisor: parking_lot::Mutex::new(None),
            current_cycle: parking_lot::Mutex::new(None),
            connect_cycles: AtomicU32::new(0),
        })
    }

    pub fn creator_id(&self) -> &str {
        &self.creator_id
    }

    pub fn chat_room_id(&self) -> &str {
        &self.chat_room_id
    }

    pub fn output_path(&self) -> &Path {
        self.writer.path()
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock()
    }

    /// Connection cycles started so far.
    pub fn connect_cycles(&self) -> u32 {
        self.connect_cycles.load(Ordering::SeqCst)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Spawn the supervisor. A session runs at most once; starting a running
    /// or stopped session does nothing.
    pub fn start(self: &Arc<Self>) {
        {
            let mut running = self.running.lock();
            if *running || self.stop_token.is_cancelled() {
                return;
            }
            *running = true;
        }

        info!(
            creator_id = %self.creator_id,
            creator = %self.display_name,
            chat_room_id = %self.chat_room_id,
            output = %self.writer.path().display(),
            "Starting chat capture"
        );

        let this = self.clone();
        let handle = tokio::spawn(async move { this.supervise().await });
        *self.supervisor.lock() = Some(handle);
    }

    async fn supervise(self: Arc<Self>) {
        loop {
            if !self.is_running() {
                break;
            }

            let cycle = self.connect_cycles.fetch_add(1, Ordering::SeqCst) + 1;
            let this = self.clone();
            let task = tokio::spawn(async move { this.run_cycle().await });
            *self.current_cycle.lock() = Some(task.abort_handle());

            let result = match task.await {
                Ok(result) => result,
                Err(join_error) => Err(Error::from(join_error)),
            };
            self.current_cycle.lock().take();

            match result {
                Ok(()) => debug!(creator_id = %self.creator_id, cycle, "Chat connection cycle ended"),
                Err(e) => warn!(
                    creator_id = %self.creator_id,
                    cycle,
                    error = %e,
                    "Chat connection cycle failed"
                ),
            }

            if !self.is_running() {
                break;
            }

            tokio::select! {
                _ = self.stop_token.cancelled() => break,
                _ = tokio::time::sleep(self.settings.timings.reconnect_backoff()) => {}
            }
        }

        debug!(creator_id = %self.creator_id, "Chat supervisor exited");
    }

    async fn run_cycle(self: Arc<Self>) -> Result<()> {
        let mut conn = self.transport.connect(&self.settings.ws_url).await?;
        let result = self.drive(conn.as_mut()).await;
        conn.close().await;
        result
    }

    async fn drive(&self, conn: &mut dyn ChatConnection) -> Result<()> {
        tokio::select! {
            _ = self.stop_token.cancelled() => return Ok(()),
            joined = self.authenticate_and_join(conn) => joined?,
        }
        self.stream(conn).await
    }

    async fn authenticate_and_join(&self, conn: &mut dyn ChatConnection) -> Result<()> {
        conn.send_text(protocol::auth_frame(&self.settings.token))
            .await?;

        tokio::time::timeout(self.settings.timings.auth_timeout(), wait_for_auth(conn))
            .await
            .map_err(|_| Error::chat("timed out waiting for authentication"))??;

        conn.send_text(protocol::join_frame(&self.chat_room_id))
            .await?;

        info!(
            creator_id = %self.creator_id,
            chat_room_id = %self.chat_room_id,
            "Joined chat room"
        );
        Ok(())
    }

    async fn stream(&self, conn: &mut dyn ChatConnection) -> Result<()> {
        let timings = &self.settings.timings;
        let now = Instant::now();

        let mut ping = tokio::time::interval_at(now + timings.ping_interval(), timings.ping_interval());
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut save = tokio::time::interval_at(now + timings.save_interval(), timings.save_interval());
        save.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let read_deadline = tokio::time::sleep(timings.read_timeout());
        tokio::pin!(read_deadline);

        loop {
            tokio::select! {
                biased;

                _ = self.stop_token.cancelled() => return Ok(()),

                _ = &mut read_deadline => {
                    return Err(Error::chat(format!(
                        "no frame received for {:?}",
                        timings.read_timeout()
                    )));
                }

                _ = ping.tick() => {
                    conn.send_text(protocol::ping_frame())
                        .await
                        .map_err(|e| Error::chat(format!("keep-alive failed: {e}")))?;
                    trace!(creator_id = %self.creator_id, "Sent chat ping");
                }

                _ = save.tick() => {
                    if let Err(e) = self.flush().await {
                        warn!(creator_id = %self.creator_id, error = %e, "Periodic chat save failed");
                    }
                }

                received = conn.recv_text() => {
                    let Some(text) = received? else {
                        return Err(Error::chat("connection closed by server"));
                    };
                    read_deadline.as_mut().reset(Instant::now() + timings.read_timeout());
                    self.handle_frame(&text).await;
                }
            }
        }
    }

    async fn handle_frame(&self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(creator_id = %self.creator_id, error = %e, "Ignoring chat frame");
                return;
            }
        };

        match frame.t {
            frame_type::SERVICE_EVENT => {
                let Some(message) = protocol::chat_message(&frame, self.start_time, Utc::now())
                else {
                    return;
                };

                let should_flush = {
                    let mut pending = self.pending.lock().await;
                    pending.push(message);
                    pending.len() >= self.settings.timings.flush_threshold
                };

                if should_flush && let Err(e) = self.flush().await {
                    warn!(creator_id = %self.creator_id, error = %e, "Chat save failed");
                }
            }
            frame_type::ERROR => {
                warn!(creator_id = %self.creator_id, payload = %frame.d, "Chat service reported an error");
            }
            other => trace!(creator_id = %self.creator_id, frame_type = other, "Unhandled chat frame"),
        }
    }

    /// Merge pending messages into the chat log.
    ///
    /// On failure the batch is put back in front of newer messages.
    pub async fn flush(&self) -> Result<usize> {
        let batch = std::mem::take(&mut *self.pending.lock().await);
        if batch.is_empty() {
            return Ok(0);
        }

        match self.writer.save(&batch).await {
            Ok(_) => Ok(batch.len()),
            Err(e) => {
                let mut pending = self.pending.lock().await;
                let newer = std::mem::replace(&mut *pending, batch);
                pending.extend(newer);
                Err(e)
            }
        }
    }

    /// Stop capturing. Idempotent.
    ///
    /// Waits up to the stop timeout for the supervisor, then aborts whatever is
    /// still running, flushes pending messages and makes sure the chat log
    /// exists (an empty array when nothing was received).
    pub async fn stop(&self) -> Result<()> {
        {
            let mut running = self.running.lock();
            *running = false;
            if self.stop_token.is_cancelled() {
                return Ok(());
            }
            self.stop_token.cancel();
        }

        let timeout = self.settings.timings.stop_timeout();
        let supervisor = self.supervisor.lock().take();
        if let Some(mut handle) = supervisor {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    creator_id = %self.creator_id,
                    error = %Error::from(e),
                    "Chat supervisor task failed"
                ),
                Err(_) => {
                    warn!(
                        creator_id = %self.creator_id,
                        "Chat capture did not stop within {:?}; aborting",
                        timeout
                    );
                    handle.abort();
                }
            }
        }

        if let Some(cycle) = self.current_cycle.lock().take() {
            cycle.abort();
        }

        let flushed = self.flush().await;
        let ensured = self.writer.ensure_exists().await;

        info!(
            creator_id = %self.creator_id,
            cycles = self.connect_cycles(),
            output = %self.writer.path().display(),
            "Chat capture stopped"
        );

        flushed?;
        ensured
    }
}

/// Read frames until the auth acknowledgement (or a rejection) arrives.
async fn wait_for_auth(conn: &mut dyn ChatConnection) -> Result<()> {
    loop {
        let Some(text) = conn.recv_text().await? else {
            return Err(Error::chat("connection closed during authentication"));
        };

        let frame = match Frame::parse(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Ignoring frame while authenticating");
                continue;
            }
        };

        match protocol::auth_reply(&frame) {
            AuthReply::Accepted => return Ok(()),
            AuthReply::Rejected(reason) => return Err(Error::chat(reason)),
            AuthReply::Other => trace!(frame_type = frame.t, "Frame before auth acknowledgement"),
        }
    }
}

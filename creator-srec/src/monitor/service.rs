//! Monitor orchestrator.
//!
//! Owns the watch-list and one poll loop per watched creator. A poll loop
//! probes the creator on a fixed interval and reacts to edges: going live
//! fires a "live start" notification and starts a recording unless one is
//! already in flight; going offline fires "live end".
//!
//! The watch-list file is the shared source of truth: every toggle re-reads
//! it before applying the change, and a rescan task picks up edits made by
//! other processes (the `watch` command) on the poll interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::registry::Registry;
use super::watchlist::{WatchEntry, WatchList};
use crate::Result;
use crate::api::LiveProber;
use crate::config::AppConfig;
use crate::recorder::{Recorder, RecordingRequest};

/// Time given to notifications still being delivered at shutdown.
const NOTIFICATION_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct PollHandle {
    token: CancellationToken,
    generation: u64,
}

pub struct MonitorService {
    config: Arc<AppConfig>,
    prober: Arc<dyn LiveProber>,
    recorder: Arc<Recorder>,
    watchlist: Mutex<WatchList>,
    /// Creators with a running poll loop.
    polling: Registry<String, PollHandle>,
    next_generation: AtomicU64,
    rescan_started: AtomicBool,
    tasks: TaskTracker,
    shutdown_token: CancellationToken,
}

impl MonitorService {
    pub fn new(
        config: Arc<AppConfig>,
        prober: Arc<dyn LiveProber>,
        recorder: Arc<Recorder>,
        watchlist: WatchList,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            prober,
            recorder,
            watchlist: Mutex::new(watchlist),
            polling: Registry::new(),
            next_generation: AtomicU64::new(0),
            rescan_started: AtomicBool::new(false),
            tasks: TaskTracker::new(),
            shutdown_token: CancellationToken::new(),
        })
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    /// Clear stale recording locks, start polling every watched creator and
    /// start the watch-list rescan.
    pub async fn start(self: &Arc<Self>) -> Result<usize> {
        self.recorder.locks().clear_stale().await?;

        let entries = self.watchlist.lock().await.entries();
        let mut started = 0;
        for entry in entries {
            if self.spawn_poll(&entry.creator_id, &entry.display_name) {
                started += 1;
            }
        }
        self.spawn_rescan();

        info!(count = started, "Monitoring started");
        Ok(started)
    }

    /// Watch the creator if unwatched, unwatch otherwise.
    ///
    /// Returns the new watching state. The file is re-read first so edits
    /// made outside this process are kept. Read and persistence failures are
    /// returned and leave the in-memory list unchanged.
    pub async fn toggle_monitoring(
        self: &Arc<Self>,
        creator_id: &str,
        display_name: &str,
    ) -> Result<bool> {
        let mut watchlist = self.watchlist.lock().await;
        self.sync_from_disk(&mut watchlist).await?;

        if let Some(previous) = watchlist.remove(creator_id) {
            if let Err(e) = watchlist.persist().await {
                watchlist.insert(creator_id, &previous);
                return Err(e);
            }

            self.stop_polling(creator_id).await;
            info!(creator_id = %creator_id, creator = %previous, "Stopped watching");
            return Ok(false);
        }

        watchlist.insert(creator_id, display_name);
        if let Err(e) = watchlist.persist().await {
            watchlist.remove(creator_id);
            return Err(e);
        }

        self.spawn_poll(creator_id, display_name);
        info!(creator_id = %creator_id, creator = %display_name, "Started watching");
        Ok(true)
    }

    /// Re-read the watch-list file now and reconcile poll loops with it.
    pub async fn rescan(self: &Arc<Self>) -> Result<()> {
        let mut watchlist = self.watchlist.lock().await;
        self.sync_from_disk(&mut watchlist).await
    }

    /// Reload `watchlist` from disk, start loops for new creators and stop
    /// loops (and chat capture) for removed ones. Caller holds the lock.
    async fn sync_from_disk(self: &Arc<Self>, watchlist: &mut WatchList) -> Result<()> {
        watchlist.reload().await?;

        for (creator_id, _) in self.polling.snapshot() {
            if !watchlist.contains(&creator_id) {
                info!(creator_id = %creator_id, "Creator removed from watch-list file");
                self.stop_polling(&creator_id).await;
            }
        }
        for entry in watchlist.entries() {
            if !self.polling.contains(&entry.creator_id)
                && self.spawn_poll(&entry.creator_id, &entry.display_name)
            {
                info!(
                    creator_id = %entry.creator_id,
                    creator = %entry.display_name,
                    "Creator added to watch-list file"
                );
            }
        }
        Ok(())
    }

    async fn stop_polling(&self, creator_id: &str) {
        if let Some(handle) = self.polling.remove(creator_id) {
            handle.token.cancel();
        }
        match self.recorder.chat().stop_session(creator_id).await {
            Ok(true) => debug!(creator_id = %creator_id, "Stopped chat capture on unwatch"),
            Ok(false) => {}
            Err(e) => warn!(creator_id = %creator_id, error = %e, "Failed to stop chat capture"),
        }
    }

    fn spawn_rescan(self: &Arc<Self>) {
        if self.shutdown_token.is_cancelled() || self.rescan_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = self.clone();
        let token = self.shutdown_token.child_token();
        let interval = self.config.livestream.poll_interval();
        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Err(e) = this.rescan().await {
                    warn!(error = %e, "Watch-list rescan failed; keeping current list");
                }
            }
            debug!("Watch-list rescan stopped");
        });
    }

    /// Spawn the creator's poll loop unless one is already running.
    fn spawn_poll(self: &Arc<Self>, creator_id: &str, display_name: &str) -> bool {
        if self.shutdown_token.is_cancelled() {
            return false;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let token = self.shutdown_token.child_token();
        let handle = PollHandle {
            token: token.clone(),
            generation,
        };
        if !self.polling.add(creator_id.to_string(), handle) {
            debug!(creator_id = %creator_id, "Already monitoring");
            return false;
        }

        let this = self.clone();
        let creator_id = creator_id.to_string();
        let display_name = display_name.to_string();
        self.tasks.spawn(async move {
            this.poll_loop(&creator_id, &display_name, token).await;
            this.polling
                .remove_if(&creator_id, |h| h.generation == generation);
        });
        true
    }

    async fn poll_loop(&self, creator_id: &str, display_name: &str, token: CancellationToken) {
        let interval = self.config.livestream.poll_interval();
        let notifier = self.recorder.notifier();
        let mut was_live = false;

        debug!(creator_id = %creator_id, ?interval, "Poll loop started");

        loop {
            let probe = tokio::select! {
                _ = token.cancelled() => break,
                probe = self.prober.check_live(creator_id) => probe,
            };

            let is_live = match probe {
                Ok(status) => status.is_live,
                Err(e) => {
                    warn!(creator_id = %creator_id, error = %e, "Liveness check failed");
                    false
                }
            };

            if is_live && !was_live {
                info!(creator_id = %creator_id, creator = %display_name, "Creator went live");
                notifier.notify_live_start(display_name, creator_id);

                if self.recorder.locks().is_locked(creator_id).await {
                    info!(creator_id = %creator_id, "Already recording");
                } else {
                    self.recorder.spawn(
                        RecordingRequest {
                            creator_id: creator_id.to_string(),
                            creator_name: display_name.to_string(),
                        },
                        self.config.clone(),
                    );
                }
            } else if !is_live && was_live {
                info!(creator_id = %creator_id, creator = %display_name, "Creator went offline");
                notifier.notify_live_end(display_name, creator_id, None);
            }
            was_live = is_live;

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        debug!(creator_id = %creator_id, "Poll loop stopped");
    }

    pub async fn watched(&self) -> Vec<WatchEntry> {
        self.watchlist.lock().await.entries()
    }

    pub async fn is_watching(&self, creator_id: &str) -> bool {
        self.watchlist.lock().await.contains(creator_id)
    }

    pub fn is_monitoring(&self, creator_id: &str) -> bool {
        self.polling.contains(creator_id)
    }

    pub fn monitoring_count(&self) -> usize {
        self.polling.len()
    }

    pub fn is_recording(&self, creator_id: &str) -> bool {
        self.recorder.is_recording(creator_id)
    }

    pub fn active_chat_sessions(&self) -> Vec<String> {
        self.recorder.chat().active_sessions()
    }

    /// Stop polling, stop chat capture, stop captures, wait up to `grace`
    /// for post-processing, then flush pending notifications.
    pub async fn shutdown(&self, grace: Duration) {
        info!("Shutting down monitor");
        self.shutdown_token.cancel();
        self.polling.drain();
        self.tasks.close();

        self.recorder.chat().shutdown().await;
        self.recorder.shutdown(grace).await;

        if tokio::time::timeout(grace, self.tasks.wait()).await.is_err() {
            warn!("Poll loops did not exit within the grace period");
        }
        self.recorder.notifier().shutdown(NOTIFICATION_GRACE).await;
        info!("Monitor stopped");
    }
}

//! Best-effort live start/end alerts.
//!
//! Sinks are awaited on tracked background tasks; a failing sink is logged
//! and never blocks or fails the monitor or the recorder. Shutdown waits
//! briefly for deliveries still in flight.

mod events;
mod webhook;

pub use events::NotificationEvent;
pub use webhook::WebhookSink;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::NotificationsConfig;

/// Destination for notification events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, event: &NotificationEvent) -> Result<()>;
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        info!(
            event = event.event_type(),
            creator_id = %event.creator_id(),
            "{}: {}",
            event.title(),
            event.description()
        );
        Ok(())
    }
}

/// Delivers every event to all inner sinks concurrently.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    /// Sinks for the given configuration; the log sink is always present.
    pub fn from_config(config: &NotificationsConfig) -> Self {
        let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink)];
        if let Some(url) = config.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
            sinks.push(Arc::new(WebhookSink::new(
                url,
                config.webhook_headers.clone(),
            )));
        }
        Self::new(sinks)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    fn name(&self) -> &'static str {
        "fanout"
    }

    /// Fails only when every inner sink failed.
    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        let results = join_all(self.sinks.iter().map(|sink| async move {
            let result = sink.send(event).await;
            if let Err(ref e) = result {
                warn!(sink = sink.name(), event = event.event_type(), error = %e, "Notification failed");
            }
            result
        }))
        .await;

        if !results.is_empty() && results.iter().all(|r| r.is_err()) {
            return Err(crate::Error::Other(format!(
                "all {} notification sinks failed",
                results.len()
            )));
        }
        Ok(())
    }
}

/// Fire-and-forget front end over a sink.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    deliveries: TaskTracker,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            deliveries: TaskTracker::new(),
        }
    }

    /// Deliveries not finished yet.
    pub fn in_flight(&self) -> usize {
        self.deliveries.len()
    }

    /// Wait up to `grace` for in-flight deliveries. Later notifications are
    /// still sent.
    pub async fn shutdown(&self, grace: Duration) {
        self.deliveries.close();
        if tokio::time::timeout(grace, self.deliveries.wait()).await.is_err() {
            warn!(
                remaining = self.deliveries.len(),
                "Notifications still pending after grace period"
            );
        } else {
            debug!("Notifications delivered");
        }
    }

    pub fn notify_live_start(&self, creator_name: &str, creator_id: &str) {
        self.dispatch(NotificationEvent::live_start(creator_name, creator_id));
    }

    pub fn notify_live_end(
        &self,
        creator_name: &str,
        creator_id: &str,
        final_filename: Option<String>,
    ) {
        self.dispatch(NotificationEvent::live_end(
            creator_name,
            creator_id,
            final_filename,
        ));
    }

    fn dispatch(&self, event: NotificationEvent) {
        let sink = self.sink.clone();
        self.deliveries.spawn(async move {
            if let Err(e) = sink.send(&event).await {
                warn!(
                    sink = sink.name(),
                    event = event.event_type(),
                    creator_id = %event.creator_id(),
                    error = %e,
                    "Failed to deliver notification"
                );
            }
        });
    }
}

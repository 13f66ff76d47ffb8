use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::session::{ChatCaptureSession, ChatSessionParams, ChatSettings};
use super::transport::ChatTransport;
use crate::Result;
use crate::monitor::Registry;

/// Owns the active chat capture sessions, at most one per creator.
pub struct ChatService {
    settings: ChatSettings,
    transport: Arc<dyn ChatTransport>,
    sessions: Registry<String, Arc<ChatCaptureSession>>,
}

impl ChatService {
    pub fn new(settings: ChatSettings, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            settings,
            transport,
            sessions: Registry::new(),
        }
    }

    /// Start capturing chat for a creator.
    ///
    /// Returns `None` when a session for the creator is already active.
    pub fn start_session(&self, params: ChatSessionParams) -> Option<Arc<ChatCaptureSession>> {
        let creator_id = params.creator_id.clone();
        let session = ChatCaptureSession::new(params, self.settings.clone(), self.transport.clone());

        if !self.sessions.add(creator_id.clone(), session.clone()) {
            debug!(creator_id = %creator_id, "Chat session already active");
            return None;
        }

        session.start();
        Some(session)
    }

    /// Stop and forget the creator's session, if any.
    pub async fn stop_session(&self, creator_id: &str) -> Result<bool> {
        let Some(session) = self.sessions.remove(creator_id) else {
            return Ok(false);
        };
        session.stop().await?;
        Ok(true)
    }

    /// Stop the given session and remove it if it is still the registered one.
    pub async fn stop_exact(&self, session: &Arc<ChatCaptureSession>) -> Result<()> {
        self.sessions
            .remove_if(session.creator_id(), |current| {
                Arc::ptr_eq(current, session)
            });
        session.stop().await
    }

    pub fn is_active(&self, creator_id: &str) -> bool {
        self.sessions.contains(creator_id)
    }

    pub fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.snapshot().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        ids
    }

    /// Stop every session concurrently, each bounded by its stop timeout.
    pub async fn shutdown(&self) {
        let sessions = self.sessions.drain();
        if sessions.is_empty() {
            return;
        }

        info!(count = sessions.len(), "Stopping chat sessions");
        let results = join_all(sessions.iter().map(|(_, session)| session.stop())).await;
        for ((creator_id, _), result) in sessions.iter().zip(results) {
            if let Err(e) = result {
                warn!(creator_id = %creator_id, error = %e, "Failed to stop chat session cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::chat::transport::ChatConnection;
    use crate::config::ChatTimings;
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;

    struct Unreachable;

    #[async_trait]
    impl ChatTransport for Unreachable {
        async fn connect(&self, _url: &str) -> Result<Box<dyn ChatConnection>> {
            Err(Error::chat("unreachable"))
        }
    }

    fn service() -> ChatService {
        ChatService::new(
            ChatSettings {
                ws_url: "wss://chat.test".into(),
                token: "tok".into(),
                timings: ChatTimings::default(),
                dedupe_by_id: false,
            },
            Arc::new(Unreachable),
        )
    }

    fn params(dir: &Path, creator_id: &str) -> ChatSessionParams {
        ChatSessionParams {
            creator_id: creator_id.into(),
            display_name: creator_id.into(),
            chat_room_id: "room".into(),
            output: dir.join(format!("{creator_id}_chat.json")),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_session_per_creator() {
        let dir = tempfile::tempdir().unwrap();
        let service = service();

        assert!(service.start_session(params(dir.path(), "123")).is_some());
        assert!(service.start_session(params(dir.path(), "123")).is_none());
        assert!(service.start_session(params(dir.path(), "456")).is_some());
        assert_eq!(service.active_sessions(), vec!["123", "456"]);

        assert!(service.stop_session("123").await.unwrap());
        assert!(!service.stop_session("123").await.unwrap());
        assert!(!service.is_active("123"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let service = service();
        let a = service.start_session(params(dir.path(), "a")).unwrap();
        let b = service.start_session(params(dir.path(), "b")).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        service.shutdown().await;
        assert!(service.active_sessions().is_empty());
        assert!(!a.is_running() && !b.is_running());
        assert!(dir.path().join("a_chat.json").exists());
    }
}

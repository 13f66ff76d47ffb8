//! Wire models for the platform API.

use serde::{Deserialize, Serialize};

/// Stream status value meaning "broadcasting right now".
pub const STREAM_STATUS_LIVE: i32 = 2;

/// Standard response envelope: `{"success": bool, "response": T}`.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub response: Option<T>,
}

/// `GET /streaming/channel/{creatorId}` payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingChannel {
    pub id: String,
    pub account_id: String,
    pub playback_url: Option<String>,
    pub chat_room_id: Option<String>,
    pub version: Option<i64>,
    pub stream: Option<ChannelStream>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelStream {
    pub id: String,
    pub status: i32,
    pub playback_url: Option<String>,
    pub access: bool,
    pub started_at: Option<i64>,
}

/// Entry of `GET /account?usernames=...`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
}

impl Account {
    /// Name used for folders and notifications.
    pub fn preferred_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.username,
        }
    }
}

/// Result of one liveness probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LiveStatus {
    pub is_live: bool,
    pub playback_url: Option<String>,
    pub chat_room_id: Option<String>,
    pub stream_id: Option<String>,
    pub stream_version: Option<i64>,
}

impl LiveStatus {
    pub fn offline() -> Self {
        Self::default()
    }

    /// Interpret a channel payload.
    ///
    /// Live requires an active stream the account can access; the stream's own
    /// playback URL wins over the channel-level one.
    pub fn from_channel(channel: &StreamingChannel) -> Self {
        let Some(stream) = channel.stream.as_ref() else {
            return Self::offline();
        };

        let is_live = stream.status == STREAM_STATUS_LIVE && stream.access;
        if !is_live {
            return Self::offline();
        }

        let playback_url = stream
            .playback_url
            .clone()
            .or_else(|| channel.playback_url.clone())
            .filter(|url| !url.is_empty());

        Self {
            is_live,
            playback_url,
            chat_room_id: channel.chat_room_id.clone().filter(|id| !id.is_empty()),
            stream_id: Some(stream.id.clone()).filter(|id| !id.is_empty()),
            stream_version: channel.version,
        }
    }
}

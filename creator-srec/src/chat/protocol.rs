//! Chat service wire format.
//!
//! Every frame is a text message `{"t": <type>, "d": "<json string>"}`; the
//! payload is itself JSON encoded as a string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::trace;

use super::message::{ChatAuthor, ChatMessage, format_elapsed};
use crate::{Error, Result};

/// Frame type codes.
pub mod frame_type {
    pub const ERROR: i64 = 0;
    pub const AUTH: i64 = 1;
    pub const PING: i64 = 2;
    pub const SERVICE_EVENT: i64 = 10000;
    pub const JOIN_ROOM: i64 = 46001;
}

/// Service id of chat room events inside a service event frame.
const CHAT_SERVICE_ID: i64 = 46;
/// Inner event type carrying a `chatRoomMessage`.
const CHAT_ROOM_MESSAGE_EVENT: i64 = 10;
/// Timestamps below this are in seconds rather than milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub t: i64,
    #[serde(default)]
    pub d: String,
}

impl Frame {
    /// Frame of type `t` with `payload` JSON-encoded into `d`.
    pub fn new(t: i64, payload: &Value) -> Self {
        Self {
            t,
            d: payload.to_string(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::chat(format!("malformed frame: {e}")))
    }

    pub fn encode(&self) -> String {
        json!({ "t": self.t, "d": self.d }).to_string()
    }

    /// Decode the string payload as JSON.
    pub fn payload(&self) -> Option<Value> {
        serde_json::from_str(&self.d).ok()
    }
}

pub fn auth_frame(token: &str) -> String {
    Frame::new(frame_type::AUTH, &json!({ "token": token })).encode()
}

pub fn join_frame(chat_room_id: &str) -> String {
    Frame::new(frame_type::JOIN_ROOM, &json!({ "chatRoomId": chat_room_id })).encode()
}

pub fn ping_frame() -> String {
    Frame {
        t: frame_type::PING,
        d: "p".to_string(),
    }
    .encode()
}

/// Outcome of a frame received while waiting for authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    Accepted,
    Rejected(String),
    /// Unrelated frame; keep waiting.
    Other,
}

pub fn auth_reply(frame: &Frame) -> AuthReply {
    match frame.t {
        frame_type::AUTH => match frame.payload() {
            Some(payload) if payload.get("session").is_some_and(Value::is_object) => {
                AuthReply::Accepted
            }
            _ => AuthReply::Rejected(format!("auth not acknowledged: {}", frame.d)),
        },
        frame_type::ERROR => AuthReply::Rejected(format!("server error: {}", frame.d)),
        _ => AuthReply::Other,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawChatRoomMessage {
    id: Value,
    sender_id: Value,
    content: String,
    #[serde(rename = "type")]
    message_type: i64,
    created_at: i64,
    username: Option<String>,
    displayname: Option<String>,
    metadata: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SenderMetadata {
    sender_is_creator: bool,
    sender_is_staff: bool,
    sender_subscription: Option<SenderSubscription>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SenderSubscription {
    tier_name: Option<String>,
}

fn value_to_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Extract the chat message carried by a service event frame, if any.
///
/// Frames of other types, other services or other event kinds yield `None`.
pub fn chat_message(
    frame: &Frame,
    session_start: DateTime<Utc>,
    received_at: DateTime<Utc>,
) -> Option<ChatMessage> {
    if frame.t != frame_type::SERVICE_EVENT {
        return None;
    }

    let service = frame.payload()?;
    if service.get("serviceId").and_then(Value::as_i64) != Some(CHAT_SERVICE_ID) {
        return None;
    }

    let event: Value = match service.get("event")? {
        Value::String(raw) => serde_json::from_str(raw).ok()?,
        other => other.clone(),
    };
    if event.get("type").and_then(Value::as_i64) != Some(CHAT_ROOM_MESSAGE_EVENT) {
        return None;
    }

    let raw: RawChatRoomMessage =
        serde_json::from_value(event.get("chatRoomMessage")?.clone()).ok()?;
    trace!(?raw, "Chat room message");

    let metadata: SenderMetadata = raw
        .metadata
        .as_deref()
        .and_then(|m| serde_json::from_str(m).ok())
        .unwrap_or_default();

    let unix_timestamp_millis = match raw.created_at {
        0 => received_at.timestamp_millis(),
        ts if ts < MILLIS_THRESHOLD => ts * 1000,
        ts => ts,
    };
    let elapsed_seconds = ((unix_timestamp_millis - session_start.timestamp_millis()) / 1000).max(0);

    let name = raw
        .displayname
        .filter(|n| !n.trim().is_empty())
        .or(raw.username)
        .unwrap_or_default();

    Some(ChatMessage {
        id: value_to_id(&raw.id),
        text: raw.content,
        message_type: raw.message_type,
        unix_timestamp_millis,
        elapsed_seconds,
        elapsed_text: format_elapsed(elapsed_seconds),
        author: ChatAuthor {
            id: value_to_id(&raw.sender_id),
            name,
            is_creator: metadata.sender_is_creator,
            is_staff: metadata.sender_is_staff,
            tier: metadata.sender_subscription.and_then(|s| s.tier_name),
        },
        received_at,
    })
}


#[cfg(test)]
mod tests {
    use super::test_frames::*;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_outbound_frames() {
        let auth = Frame::parse(&auth_frame("tok")).unwrap();
        assert_eq!(auth.t, frame_type::AUTH);
        assert_eq!(auth.payload().unwrap()["token"], "tok");

        let join = Frame::parse(&join_frame("room-1")).unwrap();
        assert_eq!(join.t, 46001);
        assert_eq!(join.payload().unwrap()["chatRoomId"], "room-1");

        let ping = Frame::parse(&ping_frame()).unwrap();
        assert_eq!(ping.t, frame_type::PING);
        assert_eq!(ping.d, "p");
    }

    #[test]
    fn test_auth_reply() {
        assert_eq!(auth_reply(&Frame::parse(&auth_ok()).unwrap()), AuthReply::Accepted);
        assert!(matches!(
            auth_reply(&Frame::parse(&auth_rejected()).unwrap()),
            AuthReply::Rejected(_)
        ));
        assert_eq!(
            auth_reply(&Frame::parse(&ping_frame()).unwrap()),
            AuthReply::Other
        );
    }

    #[test]
    fn test_chat_message_extraction() {
        let start = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let frame = Frame::parse(&chat_frame("m1", "hello", 1_700_000_065_000)).unwrap();

        let message = chat_message(&frame, start, Utc::now()).unwrap();
        assert_eq!(message.id, "m1");
        assert_eq!(message.text, "hello");
        assert_eq!(message.elapsed_seconds, 65);
        assert_eq!(message.elapsed_text, "00:01:05");
        assert_eq!(message.author.name, "Bob");
        assert_eq!(message.author.tier.as_deref(), Some("Gold"));
    }

    #[test]
    fn test_seconds_timestamps_are_normalized() {
        let start = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let frame = Frame::parse(&chat_frame("m1", "x", 1_700_000_010)).unwrap();
        let message = chat_message(&frame, start, Utc::now()).unwrap();
        assert_eq!(message.unix_timestamp_millis, 1_700_000_010_000);
    }

    #[test]
    fn test_non_chat_frames_are_ignored() {
        let now = Utc::now();
        assert!(chat_message(&Frame::parse(&ping_frame()).unwrap(), now, now).is_none());

        let other_service = Frame::new(
            frame_type::SERVICE_EVENT,
            &json!({ "serviceId": 15, "event": "{\"type\":10}" }),
        );
        assert!(chat_message(&other_service, now, now).is_none());
    }

    #[test]
    fn test_malformed_frame() {
        assert!(matches!(Frame::parse("not json"), Err(Error::Chat(_))));
    }
}

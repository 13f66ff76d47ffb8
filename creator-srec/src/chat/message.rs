use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender of a chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatAuthor {
    pub id: String,
    pub name: String,
    pub is_creator: bool,
    pub is_staff: bool,
    /// Subscription tier name, when the sender is subscribed.
    pub tier: Option<String>,
}

/// One chat message as stored in the `_chat.json` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub message_type: i64,
    pub unix_timestamp_millis: i64,
    /// Seconds since the capture session started.
    #[serde(default)]
    pub elapsed_seconds: i64,
    /// `elapsed_seconds` as `HH:MM:SS`.
    #[serde(default)]
    pub elapsed_text: String,
    #[serde(default)]
    pub author: ChatAuthor,
    pub received_at: DateTime<Utc>,
}

/// Format a duration in seconds as `HH:MM:SS` (hours are not wrapped).
pub fn format_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(3725), "01:02:05");
        assert_eq!(format_elapsed(100 * 3600), "100:00:00");
        assert_eq!(format_elapsed(-5), "00:00:00");
    }

    #[test]
    fn test_serializes_camel_case() {
        let message = ChatMessage {
            id: "m1".into(),
            text: "hi".into(),
            message_type: 0,
            unix_timestamp_millis: 1_700_000_000_000,
            elapsed_seconds: 5,
            elapsed_text: format_elapsed(5),
            author: ChatAuthor {
                id: "u1".into(),
                name: "bob".into(),
                is_creator: false,
                is_staff: true,
                tier: None,
            },
            received_at: Utc::now(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["unixTimestampMillis"], 1_700_000_000_000i64);
        assert_eq!(json["elapsedText"], "00:00:05");
        assert_eq!(json["author"]["isStaff"], true);
    }
}

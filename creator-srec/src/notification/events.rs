use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live broadcast transitions reported to notification sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    LiveStart {
        creator_name: String,
        creator_id: String,
        timestamp: DateTime<Utc>,
    },
    LiveEnd {
        creator_name: String,
        creator_id: String,
        /// Final recording, when the end was observed by a recording session.
        final_filename: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn live_start(creator_name: impl Into<String>, creator_id: impl Into<String>) -> Self {
        Self::LiveStart {
            creator_name: creator_name.into(),
            creator_id: creator_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn live_end(
        creator_name: impl Into<String>,
        creator_id: impl Into<String>,
        final_filename: Option<String>,
    ) -> Self {
        Self::LiveEnd {
            creator_name: creator_name.into(),
            creator_id: creator_id.into(),
            final_filename,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LiveStart { .. } => "live_start",
            Self::LiveEnd { .. } => "live_end",
        }
    }

    pub fn creator_id(&self) -> &str {
        match self {
            Self::LiveStart { creator_id, .. } | Self::LiveEnd { creator_id, .. } => creator_id,
        }
    }

    pub fn creator_name(&self) -> &str {
        match self {
            Self::LiveStart { creator_name, .. } | Self::LiveEnd { creator_name, .. } => {
                creator_name
            }
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::LiveStart { timestamp, .. } | Self::LiveEnd { timestamp, .. } => *timestamp,
        }
    }

    pub fn title(&self) -> String {
        match self {
            Self::LiveStart { creator_name, .. } => format!("{creator_name} is live"),
            Self::LiveEnd { creator_name, .. } => format!("{creator_name} ended the stream"),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::LiveStart { creator_id, .. } => format!("Creator {creator_id} started streaming"),
            Self::LiveEnd {
                final_filename: Some(file),
                ..
            } => format!("Recording saved to {file}"),
            Self::LiveEnd { .. } => "Stream went offline".to_string(),
        }
    }
}

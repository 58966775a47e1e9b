//! Wire types exchanged with the chat backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::ChartRef;
use crate::card::DataCard;

/// Event tags this crate understands, in wire spelling.
pub const SERVER_EVENT_TYPES: [&str; 7] = [
    "connected",
    "metadata",
    "thinking",
    "content",
    "chart_block",
    "done",
    "error",
];

/// A typed server-to-client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected,
    #[serde(rename_all = "camelCase")]
    Metadata {
        #[serde(default)]
        data_cards: Vec<DataCard>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    Thinking {
        #[serde(default)]
        phase: String,
        #[serde(default)]
        content: String,
    },
    Content {
        #[serde(default)]
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    ChartBlock {
        symbol: String,
        #[serde(default = "default_time_range")]
        time_range: String,
    },
    #[serde(rename_all = "camelCase")]
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    Error {
        #[serde(default)]
        error: String,
    },
}

impl ServerEvent {
    pub fn content(delta: impl Into<String>) -> Self {
        Self::Content {
            content: delta.into(),
        }
    }

    /// `done` and `error` end the current turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

fn default_time_range() -> String {
    ChartRef::DEFAULT_RANGE.to_owned()
}

/// Speaker of a history entry or message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Prior turn content sent along with a new chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Client-to-server message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Chat {
        message: String,
        conversation_history: Vec<HistoryEntry>,
        selected_tickers: Vec<String>,
        timezone: String,
    },
}

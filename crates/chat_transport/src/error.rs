use std::time::Duration;

use thiserror::Error;

/// Failure opening or using the physical channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("invalid header '{name}'")]
    InvalidHeader { name: String },

    #[error("connect attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(error))
    }
}

/// A server frame that could not be turned into a typed event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame has no string 'type' field")]
    MissingType,

    #[error("'{event_type}' frame has an invalid payload: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Rejection returned to callers of [`crate::ChatClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,

    #[error("a previous turn is still streaming")]
    TurnInFlight,

    #[error("message is empty")]
    EmptyMessage,

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("client has shut down")]
    Closed,
}

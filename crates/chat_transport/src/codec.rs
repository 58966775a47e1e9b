use serde_json::Value;
use stream_blocks::protocol::SERVER_EVENT_TYPES;
use stream_blocks::{ClientMessage, ServerEvent};

use crate::error::{ClientError, DecodeError};

/// Decode one text frame into a typed server event.
///
/// Frames with an unrecognized `type` decode to `Ok(None)` so newer servers
/// can add event kinds without breaking older clients.
pub fn decode_server_event(frame: &str) -> Result<Option<ServerEvent>, DecodeError> {
    let value: Value = serde_json::from_str(frame)?;
    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_owned();

    if !SERVER_EVENT_TYPES.contains(&event_type.as_str()) {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| DecodeError::Payload { event_type, source })
}

pub fn encode_client_message(message: &ClientMessage) -> Result<String, ClientError> {
    serde_json::to_string(message).map_err(|error| ClientError::Encode(error.to_string()))
}

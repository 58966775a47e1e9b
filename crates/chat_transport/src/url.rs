use url::Url;

use crate::error::TransportError;

/// Default base URL for the chat backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";

const WS_PATH: &str = "/ws";
const EVENTS_PATH: &str = "/events";
const CHAT_PATH: &str = "/chat";

/// Normalize a base URL to the socket endpoint.
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_BASE_URL`]
/// 2) `http`/`https` become `ws`/`wss`
/// 3) `/ws` is appended unless the path already ends with it
pub fn normalize_ws_url(input: &str) -> Result<String, TransportError> {
    let base = swap_scheme(base_or_default(input), &[("https://", "wss://"), ("http://", "ws://")]);
    let endpoint = if base.ends_with(WS_PATH) {
        base
    } else {
        format!("{base}{WS_PATH}")
    };
    validate(&endpoint, &["ws", "wss"])
}

/// Normalize a base URL to the HTTP root used by the SSE transport.
///
/// `ws`/`wss` become `http`/`https` and a trailing `/ws` is dropped.
pub fn normalize_http_base(input: &str) -> Result<String, TransportError> {
    let base = swap_scheme(base_or_default(input), &[("wss://", "https://"), ("ws://", "http://")]);
    let base = base.strip_suffix(WS_PATH).map(str::to_owned).unwrap_or(base);
    validate(&base, &["http", "https"])
}

/// Downlink endpoint streaming server events.
pub fn events_url(http_base: &str) -> String {
    format!("{http_base}{EVENTS_PATH}")
}

/// Uplink endpoint accepting one chat message per POST.
pub fn chat_url(http_base: &str) -> String {
    format!("{http_base}{CHAT_PATH}")
}

fn base_or_default(input: &str) -> &str {
    let trimmed = input.trim();
    let base = if trimmed.is_empty() {
        DEFAULT_BASE_URL
    } else {
        trimmed
    };
    base.trim_end_matches('/')
}

fn swap_scheme(base: &str, pairs: &[(&str, &str)]) -> String {
    for (from, to) in pairs {
        if let Some(rest) = base.strip_prefix(from) {
            return format!("{to}{rest}");
        }
    }
    base.to_owned()
}

fn validate(endpoint: &str, schemes: &[&str]) -> Result<String, TransportError> {
    let parsed = Url::parse(endpoint)
        .map_err(|error| TransportError::InvalidUrl(format!("{endpoint}: {error}")))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(TransportError::InvalidUrl(format!(
            "{endpoint}: unsupported scheme '{}'",
            parsed.scheme()
        )));
    }
    Ok(endpoint.to_owned())
}

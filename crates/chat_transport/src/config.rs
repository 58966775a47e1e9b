use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use crate::reconnect::{
    FIRST_CONNECT_GRACE_MS, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY_MS, RECONNECT_GRACE_MS,
};
use crate::url::DEFAULT_BASE_URL;

pub const ENV_URL: &str = "CHAT_STREAM_URL";
pub const ENV_TRANSPORT: &str = "CHAT_STREAM_TRANSPORT";
pub const ENV_TOKEN: &str = "CHAT_STREAM_TOKEN";
pub const ENV_TIMEZONE: &str = "CHAT_STREAM_TIMEZONE";
pub const ENV_RECONNECT_DELAY_MS: &str = "CHAT_STREAM_RECONNECT_DELAY_MS";
pub const ENV_MAX_RECONNECTS: &str = "CHAT_STREAM_MAX_RECONNECTS";

/// Physical channel used to reach the chat backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    #[default]
    WebSocket,
    /// Server-sent events for the downlink, one POST per turn for the uplink.
    Sse,
}

impl TransportKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Some(Self::WebSocket),
            "sse" | "http" => Some(Self::Sse),
            _ => None,
        }
    }
}

/// Connection and reconnect configuration for [`crate::ChatClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the chat backend.
    pub base_url: String,
    pub transport: TransportKind,
    /// Optional bearer token sent on connect.
    pub access_token: Option<String>,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into connect requests.
    pub extra_headers: BTreeMap<String, String>,
    /// IANA timezone attached to every chat message.
    pub timezone: String,
    /// Delay before each automatic reconnect attempt.
    pub reconnect_delay: Duration,
    /// Consecutive automatic reconnects before giving up.
    pub max_reconnect_attempts: u32,
    /// Grace period before reporting offline when no connection ever opened.
    pub first_connect_grace: Duration,
    /// Grace period before reporting offline after a prior successful connection.
    pub reconnect_grace: Duration,
    /// Optional bound on a single connect attempt.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            transport: TransportKind::default(),
            access_token: None,
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timezone: "UTC".to_string(),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            first_connect_grace: Duration::from_millis(FIRST_CONNECT_GRACE_MS),
            reconnect_grace: Duration::from_millis(RECONNECT_GRACE_MS),
            connect_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Build a config from `CHAT_STREAM_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; blank values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get(ENV_URL) {
            config.base_url = url.trim().to_string();
        }
        if let Some(kind) = get(ENV_TRANSPORT).and_then(|value| TransportKind::parse(&value)) {
            config.transport = kind;
        }
        config.access_token = get(ENV_TOKEN).map(|token| token.trim().to_string());
        if let Some(timezone) = get(ENV_TIMEZONE) {
            config.timezone = timezone.trim().to_string();
        }
        if let Some(delay) = get(ENV_RECONNECT_DELAY_MS).and_then(|value| value.trim().parse().ok())
        {
            config.reconnect_delay = Duration::from_millis(delay);
        }
        if let Some(max) = get(ENV_MAX_RECONNECTS).and_then(|value| value.trim().parse().ok()) {
            config.max_reconnect_attempts = max;
        }

        config
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_grace_periods(mut self, first_connect: Duration, reconnect: Duration) -> Self {
        self.first_connect_grace = first_connect;
        self.reconnect_grace = reconnect;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    /// Headers sent when opening a connection.
    pub fn connect_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if let Some(token) = self.access_token.as_deref().map(str::trim) {
            if !token.is_empty() {
                headers.insert("authorization".to_owned(), format!("Bearer {token}"));
            }
        }
        let user_agent = self
            .user_agent
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(default_user_agent);
        headers.insert("user-agent".to_owned(), user_agent);
        for (key, value) in &self.extra_headers {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
        }
        headers
    }
}

fn default_user_agent() -> String {
    format!(
        "chat-stream/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

use std::time::Duration;

use crate::config::ClientConfig;

/// Delay before each automatic reconnect attempt.
pub const RECONNECT_DELAY_MS: u64 = 3000;
/// Consecutive automatic reconnects before the session is declared failed.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Offline grace when no connection has opened yet in this session.
pub const FIRST_CONNECT_GRACE_MS: u64 = 2000;
/// Offline grace after a connection that had opened drops.
pub const RECONNECT_GRACE_MS: u64 = 500;

/// Fixed-delay, bounded reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
    pub first_connect_grace: Duration,
    pub reconnect_grace: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(RECONNECT_DELAY_MS),
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            first_connect_grace: Duration::from_millis(FIRST_CONNECT_GRACE_MS),
            reconnect_grace: Duration::from_millis(RECONNECT_GRACE_MS),
        }
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            delay: config.reconnect_delay,
            max_attempts: config.max_reconnect_attempts,
            first_connect_grace: config.first_connect_grace,
            reconnect_grace: config.reconnect_grace,
        }
    }

    /// How long a close may go unreported before observers see "offline".
    pub fn grace_period(&self, has_connected_before: bool) -> Duration {
        if has_connected_before {
            self.reconnect_grace
        } else {
            self.first_connect_grace
        }
    }

    /// Whether another automatic attempt may follow `attempts_so_far` failures.
    pub fn allows_attempt(&self, attempts_so_far: u32) -> bool {
        attempts_so_far < self.max_attempts
    }
}

//! Connection lifecycle as a pure state machine.
//!
//! [`Lifecycle`] never touches a socket or a timer. Each input returns the
//! [`Effect`]s the caller must carry out, which keeps the reconnect policy
//! testable without a runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::reconnect::ReconnectPolicy;

/// Shared flag set synchronously when the session is torn down.
pub type TeardownSignal = Arc<AtomicBool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// Automatic reconnects are exhausted; only an explicit retry leaves this state.
    Failed,
}

/// Side effect requested by the lifecycle machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    OpenSocket,
    CloseSocket,
    ScheduleReconnect(Duration),
    CancelReconnect,
    ScheduleOfflineNotice(Duration),
    CancelOfflineNotice,
    /// Flip the externally visible connectivity flag.
    Connectivity(bool),
    ReconnectsExhausted,
}

#[derive(Debug)]
pub struct Lifecycle {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempts: u32,
    has_connected: bool,
    reconnect_scheduled: bool,
    offline_scheduled: bool,
    reported: Option<bool>,
    teardown: TeardownSignal,
}

impl Lifecycle {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self::with_teardown_signal(policy, Arc::new(AtomicBool::new(false)))
    }

    pub fn with_teardown_signal(policy: ReconnectPolicy, teardown: TeardownSignal) -> Self {
        Self {
            policy,
            state: ConnectionState::Disconnected,
            attempts: 0,
            has_connected: false,
            reconnect_scheduled: false,
            offline_scheduled: false,
            reported: None,
            teardown,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Automatic reconnects scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn is_torn_down(&self) -> bool {
        self.teardown.load(Ordering::Acquire)
    }

    pub fn teardown_signal(&self) -> TeardownSignal {
        Arc::clone(&self.teardown)
    }

    /// Whether a reconnect or offline-notice timer is outstanding.
    pub fn has_pending_timers(&self) -> bool {
        self.reconnect_scheduled || self.offline_scheduled
    }

    /// Open a connection unless one is already open or being opened.
    pub fn connect(&mut self) -> Vec<Effect> {
        if self.is_torn_down()
            || matches!(
                self.state,
                ConnectionState::Connecting | ConnectionState::Open
            )
        {
            return Vec::new();
        }

        if self.state == ConnectionState::Failed {
            self.attempts = 0;
        }

        let mut effects = Vec::new();
        if std::mem::take(&mut self.reconnect_scheduled) {
            effects.push(Effect::CancelReconnect);
        }
        self.state = ConnectionState::Connecting;
        effects.push(Effect::OpenSocket);
        effects
    }

    /// User-triggered retry; clears the attempt counter first.
    pub fn retry(&mut self) -> Vec<Effect> {
        self.attempts = 0;
        if self.state == ConnectionState::Failed {
            self.state = ConnectionState::Disconnected;
        }
        self.connect()
    }

    pub fn on_open(&mut self) -> Vec<Effect> {
        if self.is_torn_down() {
            return vec![Effect::CloseSocket];
        }

        self.state = ConnectionState::Open;
        self.attempts = 0;
        self.has_connected = true;
        info!("connection open");

        let mut effects = Vec::new();
        if std::mem::take(&mut self.offline_scheduled) {
            effects.push(Effect::CancelOfflineNotice);
        }
        if self.reported != Some(true) {
            self.reported = Some(true);
            effects.push(Effect::Connectivity(true));
        }
        effects
    }

    /// A connect attempt failed or a live connection closed.
    pub fn on_closed(&mut self) -> Vec<Effect> {
        if self.is_torn_down() {
            self.state = ConnectionState::Disconnected;
            return Vec::new();
        }
        if matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Failed
        ) {
            return Vec::new();
        }

        self.state = ConnectionState::Disconnected;
        let mut effects = Vec::new();

        if !self.offline_scheduled && self.reported != Some(false) {
            self.offline_scheduled = true;
            effects.push(Effect::ScheduleOfflineNotice(
                self.policy.grace_period(self.has_connected),
            ));
        }

        if self.policy.allows_attempt(self.attempts) {
            self.attempts += 1;
            self.reconnect_scheduled = true;
            info!(
                attempt = self.attempts,
                max = self.policy.max_attempts,
                "connection closed, reconnect scheduled"
            );
            effects.push(Effect::ScheduleReconnect(self.policy.delay));
        } else {
            warn!(attempts = self.attempts, "reconnect attempts exhausted");
            self.state = ConnectionState::Failed;
            effects.push(Effect::ReconnectsExhausted);
        }

        effects
    }

    pub fn on_reconnect_due(&mut self) -> Vec<Effect> {
        self.reconnect_scheduled = false;
        if self.is_torn_down() || self.state != ConnectionState::Disconnected {
            return Vec::new();
        }
        self.state = ConnectionState::Connecting;
        vec![Effect::OpenSocket]
    }

    pub fn on_offline_notice_due(&mut self) -> Vec<Effect> {
        self.offline_scheduled = false;
        if self.is_torn_down() || self.state == ConnectionState::Open {
            return Vec::new();
        }
        if self.reported == Some(false) {
            return Vec::new();
        }
        self.reported = Some(false);
        vec![Effect::Connectivity(false)]
    }

    /// Mark the session as tearing down, then release the socket and timers.
    pub fn teardown(&mut self) -> Vec<Effect> {
        self.teardown.store(true, Ordering::Release);

        let mut effects = Vec::new();
        if std::mem::take(&mut self.reconnect_scheduled) {
            effects.push(Effect::CancelReconnect);
        }
        if std::mem::take(&mut self.offline_scheduled) {
            effects.push(Effect::CancelOfflineNotice);
        }
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            effects.push(Effect::CloseSocket);
        }
        self.state = ConnectionState::Disconnected;
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionState, Effect, Lifecycle};
    use crate::reconnect::ReconnectPolicy;

    #[test]
    fn first_failure_uses_long_grace() {
        let policy = ReconnectPolicy::default();
        let mut lifecycle = Lifecycle::new(policy);
        lifecycle.connect();
        let effects = lifecycle.on_closed();
        assert_eq!(
            effects,
            vec![
                Effect::ScheduleOfflineNotice(policy.first_connect_grace),
                Effect::ScheduleReconnect(policy.delay),
            ]
        );
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn open_after_drop_cancels_pending_offline_notice() {
        let mut lifecycle = Lifecycle::new(ReconnectPolicy::default());
        lifecycle.connect();
        lifecycle.on_open();
        lifecycle.on_closed();
        lifecycle.on_reconnect_due();
        assert_eq!(lifecycle.on_open(), vec![Effect::CancelOfflineNotice]);
    }
}

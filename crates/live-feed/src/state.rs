//! # Connection State Machine
//!
//! The channel lifecycle as a pure transition function. The runtime feeds it
//! [`Event`]s and carries out the [`Action`]s it returns, so reconnect and
//! resubscription behaviour can be exercised without a network.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::config::ReconnectPolicy;

/// Connection status of the live feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    #[serde(rename_all = "camelCase")]
    Disconnected {
        will_reconnect: bool,
    },
    Stopped,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the state machine.
///
/// Session events carry the generation of the session that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Opened { generation: u64 },
    Closed { generation: u64 },
    Failed { generation: u64, reason: String },
    HeartbeatTimeout { generation: u64 },
    ReconnectTimer,
    Shutdown,
}

impl Event {
    /// Why the session was lost, for disconnect events.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Closed { .. } => Some("connection closed".to_string()),
            Self::Failed { reason, .. } => Some(reason.clone()),
            Self::HeartbeatTimeout { .. } => Some("heartbeat timeout".to_string()),
            _ => None,
        }
    }

    const fn generation(&self) -> Option<u64> {
        match self {
            Self::Opened { generation }
            | Self::Closed { generation }
            | Self::Failed { generation, .. }
            | Self::HeartbeatTimeout { generation } => Some(*generation),
            _ => None,
        }
    }
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a new session tagged with `generation`.
    Open { generation: u64 },
    /// Subscribe to the topic of every known vehicle.
    Resubscribe,
    /// Fire [`Event::ReconnectTimer`] after `delay`.
    ScheduleReconnect { delay: Duration, attempt: u32 },
    CancelReconnect,
    /// Close the current session, if any.
    Close,
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    generation: u64,
    attempts: u32,
    policy: ReconnectPolicy,
}

impl ConnectionMachine {
    #[must_use]
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self { state: ConnectionState::Idle, generation: 0, attempts: 0, policy }
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Generation of the current (or most recent) session.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Consecutive failed connection attempts since the last successful open.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Apply `event`, returning the actions the runtime must carry out.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        use ConnectionState::{Connected, Connecting, Disconnected, Idle, Stopped};

        if self.state == Stopped {
            return Vec::new();
        }
        if event.generation().is_some_and(|generation| generation != self.generation) {
            tracing::debug!(?event, current = self.generation, "ignoring stale session event");
            return Vec::new();
        }

        match (self.state, event) {
            (Idle, Event::Start) | (Disconnected { will_reconnect: true }, Event::ReconnectTimer) => {
                self.generation += 1;
                self.state = Connecting;
                vec![Action::Open { generation: self.generation }]
            }
            (Connecting, Event::Opened { .. }) => {
                self.attempts = 0;
                self.state = Connected;
                vec![Action::Resubscribe]
            }
            (
                Connecting | Connected,
                Event::Closed { .. } | Event::Failed { .. } | Event::HeartbeatTimeout { .. },
            ) => {
                self.attempts = self.attempts.saturating_add(1);
                if self.policy.allows(self.attempts) {
                    self.state = Disconnected { will_reconnect: true };
                    let delay = self.policy.delay_for(self.attempts);
                    vec![Action::Close, Action::ScheduleReconnect { delay, attempt: self.attempts }]
                } else {
                    self.state = Disconnected { will_reconnect: false };
                    vec![Action::Close]
                }
            }
            (_, Event::Shutdown) => {
                self.state = Stopped;
                vec![Action::CancelReconnect, Action::Close]
            }
            (state, event) => {
                tracing::debug!(%state, ?event, "event has no effect");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn connected() -> ConnectionMachine {
        let mut machine = ConnectionMachine::new(ReconnectPolicy::default());
        machine.handle(Event::Start);
        machine.handle(Event::Opened { generation: 1 });
        machine
    }

    #[test]
    fn start_opens_then_resubscribes() {
        let mut machine = ConnectionMachine::new(ReconnectPolicy::default());

        assert_eq!(machine.handle(Event::Start), vec![Action::Open { generation: 1 }]);
        assert_eq!(machine.state(), ConnectionState::Connecting);

        assert_eq!(machine.handle(Event::Opened { generation: 1 }), vec![Action::Resubscribe]);
        assert!(machine.state().is_connected());
    }

    #[test]
    fn close_schedules_fixed_delay() {
        let mut machine = connected();

        let actions = machine.handle(Event::Closed { generation: 1 });
        assert_eq!(
            actions,
            vec![
                Action::Close,
                Action::ScheduleReconnect { delay: Duration::from_secs(5), attempt: 1 }
            ]
        );
        assert_eq!(machine.state(), ConnectionState::Disconnected { will_reconnect: true });

        assert_eq!(machine.handle(Event::ReconnectTimer), vec![Action::Open { generation: 2 }]);
        assert_eq!(machine.handle(Event::Opened { generation: 2 }), vec![Action::Resubscribe]);
        assert_eq!(machine.attempts(), 0);
    }

    #[test]
    fn failed_open_counts_attempts() {
        let policy = ReconnectPolicy { max_attempts: Some(2), ..ReconnectPolicy::default() };
        let mut machine = ConnectionMachine::new(policy);
        machine.handle(Event::Start);

        let failed = |generation| Event::Failed { generation, reason: "refused".to_string() };

        machine.handle(failed(1));
        assert_eq!(machine.attempts(), 1);
        machine.handle(Event::ReconnectTimer);
        machine.handle(failed(2));
        assert_eq!(machine.state(), ConnectionState::Disconnected { will_reconnect: true });

        machine.handle(Event::ReconnectTimer);
        assert_eq!(machine.handle(failed(3)), vec![Action::Close]);
        assert_eq!(machine.state(), ConnectionState::Disconnected { will_reconnect: false });

        // no timer is pending and none is honoured
        assert!(machine.handle(Event::ReconnectTimer).is_empty());
    }

    #[test]
    fn stale_generation_ignored() {
        let mut machine = connected();
        machine.handle(Event::HeartbeatTimeout { generation: 1 });
        machine.handle(Event::ReconnectTimer);
        machine.handle(Event::Opened { generation: 2 });

        assert!(machine.handle(Event::Closed { generation: 1 }).is_empty());
        assert!(machine.state().is_connected());
    }

    #[test]
    fn shutdown_is_terminal() {
        let mut machine = connected();
        machine.handle(Event::Closed { generation: 1 });

        assert_eq!(machine.handle(Event::Shutdown), vec![Action::CancelReconnect, Action::Close]);
        assert_eq!(machine.state(), ConnectionState::Stopped);

        assert!(machine.handle(Event::ReconnectTimer).is_empty());
        assert!(machine.handle(Event::Start).is_empty());
        assert!(machine.handle(Event::Shutdown).is_empty());
    }

    #[test]
    fn opened_only_while_connecting() {
        let mut machine = connected();
        assert!(machine.handle(Event::Opened { generation: 1 }).is_empty());
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_value(ConnectionState::Disconnected { will_reconnect: true })
            .expect("should serialize");
        assert_eq!(json, serde_json::json!({"state": "disconnected", "willReconnect": true}));
    }
}

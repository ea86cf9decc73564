//! # Feed Configuration
//!
//! Topic naming, heartbeat intervals, and the reconnect policy used by the
//! live feed client.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use vehicle_state::VehicleId;

/// Topic prefix each vehicle's updates are published under.
pub const DEFAULT_TOPIC_PREFIX: &str = "/topic/vehicle/";

/// Live feed client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub topic_prefix: String,
    pub heartbeat: HeartbeatConfig,
    pub reconnect: ReconnectPolicy,
    /// How long a handshake may take before the attempt counts as failed.
    /// Zero waits indefinitely.
    pub connect_timeout: Duration,
}

impl FeedConfig {
    /// The topic carrying updates for `vehicle_id`.
    #[must_use]
    pub fn topic_for(&self, vehicle_id: &VehicleId) -> String {
        format!("{}{vehicle_id}", self.topic_prefix)
    }

    /// Instant after which a handshake started at `started` is abandoned.
    pub(crate) fn connect_deadline(&self, started: Instant) -> Option<Instant> {
        (!self.connect_timeout.is_zero()).then(|| started + self.connect_timeout)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Keep-alive intervals. A zero duration disables that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often a heartbeat frame is sent to the broker.
    pub outgoing: Duration,
    /// How long the session may stay silent before it is considered lost.
    pub incoming: Duration,
}

impl HeartbeatConfig {
    #[must_use]
    pub const fn disabled() -> Self {
        Self { outgoing: Duration::ZERO, incoming: Duration::ZERO }
    }

    /// Ticker for outgoing heartbeats, first tick one period from now.
    pub(crate) fn ticker(&self) -> Option<Interval> {
        if self.outgoing.is_zero() {
            return None;
        }
        let mut interval = tokio::time::interval_at(Instant::now() + self.outgoing, self.outgoing);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(interval)
    }

    /// Instant after which a session silent since `last_inbound` is lost.
    pub(crate) fn deadline(&self, last_inbound: Instant) -> Option<Instant> {
        (!self.incoming.is_zero()).then(|| last_inbound + self.incoming)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { outgoing: Duration::from_secs(4), incoming: Duration::from_secs(4) }
    }
}

/// When and how often to reconnect after losing the session.
///
/// The default retries forever with a fixed five second delay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    /// Multiplier applied to the delay for each consecutive failure.
    pub backoff: Option<f64>,
    /// Upper bound for a backed-off delay.
    pub max_delay: Duration,
    /// Consecutive failed attempts after which the client gives up.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Fixed delay, unbounded retries.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let Some(factor) = self.backoff.filter(|f| f.is_finite() && *f > 1.0) else {
            return self.delay;
        };

        let ceiling = self.max_delay.max(self.delay);
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.delay.as_secs_f64() * factor.powi(exponent);
        Duration::try_from_secs_f64(scaled).map_or(ceiling, |delay| delay.min(ceiling))
    }

    /// Whether reconnect attempt `attempt` (1-based) may go ahead.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            backoff: None,
            max_delay: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn topic_per_vehicle() {
        let config = FeedConfig::default();
        assert_eq!(config.topic_for(&VehicleId::from(1_u64)), "/topic/vehicle/1");
    }

    #[test]
    fn fixed_delay_by_default() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(50), Duration::from_secs(5));
        assert!(policy.allows(u32::MAX));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = ReconnectPolicy {
            delay: Duration::from_secs(1),
            backoff: Some(2.0),
            max_delay: Duration::from_secs(10),
            max_attempts: Some(3),
        };

        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(10));

        assert!(policy.allows(3));
        assert!(!policy.allows(4));
    }

    #[test]
    fn shrinking_backoff_is_ignored() {
        let policy = ReconnectPolicy { backoff: Some(0.5), ..ReconnectPolicy::default() };
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
    }

    #[test]
    fn zero_connect_timeout_waits() {
        let now = Instant::now();
        let config = FeedConfig { connect_timeout: Duration::ZERO, ..FeedConfig::default() };
        assert!(config.connect_deadline(now).is_none());
        assert_eq!(FeedConfig::default().connect_deadline(now), Some(now + Duration::from_secs(10)));
    }

    #[test]
    fn zero_heartbeat_disables() {
        let heartbeat = HeartbeatConfig::disabled();
        assert!(heartbeat.deadline(Instant::now()).is_none());
    }
}

//! # Tracker Configuration
//!
//! Tunables read from the environment. Unset or unparsable values fall back
//! to their defaults. Service base URLs are not read here; they come from the
//! provider's `Config` (`FLEET_URL`, `TRACKING_URL`).

use std::env;
use std::time::Duration;

use live_feed::{DEFAULT_TOPIC_PREFIX, FeedConfig, HeartbeatConfig, ReconnectPolicy};
use vehicle_state::OrderingPolicy;
use vehicle_state::diagnostics::DEFAULT_CAPACITY;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub feed: FeedConfig,
    pub diagnostic_capacity: usize,
    pub ordering: OrderingPolicy,
}

impl TrackerConfig {
    /// Read configuration from process environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns the raw value of a
    /// variable when it is set.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env_u64 = |key: &str| lookup(key).and_then(|value| value.trim().parse::<u64>().ok());
        let env_millis = |key: &str, default: Duration| {
            env_u64(key).map_or(default, Duration::from_millis)
        };

        let topic_prefix = lookup("TRACKING_TOPIC_PREFIX")
            .filter(|prefix| !prefix.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string());

        let heartbeat_defaults = HeartbeatConfig::default();
        let heartbeat = HeartbeatConfig {
            outgoing: env_millis("TRACKING_HEARTBEAT_OUTGOING_MS", heartbeat_defaults.outgoing),
            incoming: env_millis("TRACKING_HEARTBEAT_INCOMING_MS", heartbeat_defaults.incoming),
        };

        let reconnect_defaults = ReconnectPolicy::default();
        let reconnect = ReconnectPolicy {
            delay: env_millis("TRACKING_RECONNECT_DELAY_MS", reconnect_defaults.delay),
            backoff: lookup("TRACKING_RECONNECT_BACKOFF")
                .and_then(|value| value.trim().parse::<f64>().ok())
                .filter(|factor| factor.is_finite() && *factor > 1.0),
            max_delay: env_millis("TRACKING_RECONNECT_MAX_DELAY_MS", reconnect_defaults.max_delay),
            // zero means retry forever
            max_attempts: env_u64("TRACKING_RECONNECT_MAX_ATTEMPTS")
                .filter(|max| *max > 0)
                .map(|max| u32::try_from(max).unwrap_or(u32::MAX)),
        };

        let connect_timeout =
            env_millis("TRACKING_CONNECT_TIMEOUT_MS", FeedConfig::default().connect_timeout);

        let diagnostic_capacity = env_u64("TRACKING_DIAGNOSTIC_CAPACITY")
            .and_then(|capacity| usize::try_from(capacity).ok())
            .filter(|capacity| *capacity > 0)
            .unwrap_or(DEFAULT_CAPACITY);

        let ordering = lookup("TRACKING_ORDERING")
            .and_then(|value| match value.parse::<OrderingPolicy>() {
                Ok(ordering) => Some(ordering),
                Err(e) => {
                    tracing::warn!("{e}, using arrival order");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            feed: FeedConfig { topic_prefix, heartbeat, reconnect, connect_timeout },
            diagnostic_capacity,
            ordering,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            diagnostic_capacity: DEFAULT_CAPACITY,
            ordering: OrderingPolicy::default(),
        }
    }
}

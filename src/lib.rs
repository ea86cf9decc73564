//! # Fleet Tracking
//!
//! Live location tracking for a vehicle fleet. The [`Tracker`] seeds vehicle
//! state from the fleet registry, fills in last known positions, and keeps
//! state current from the live position feed across connection loss.

mod config;
mod http;
mod loader;
mod tracker;

pub use live_feed::{
    Channel, ConnectionState, FeedConfig, Frame, HeartbeatConfig, ReconnectPolicy, Session,
};
pub use vehicle_state::{
    LogEntry, OrderingPolicy, PositionSample, VehicleId, VehicleIdentity, VehicleStatus,
    VehicleTrackState,
};

pub use self::config::TrackerConfig;
pub use self::http::router;
pub use self::loader::{SnapshotSummary, load_registry, load_snapshots};
pub use self::tracker::{Tracker, TrackerStatus};

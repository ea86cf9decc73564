//! # Vehicle State
//!
//! The authoritative per-vehicle tracking table and the diagnostic log that
//! records what happened to it.

pub mod diagnostics;
pub mod model;
pub mod store;

pub use self::diagnostics::{DiagnosticLog, LogEntry};
pub use self::model::*;
pub use self::store::{ApplyOutcome, DropReason, OrderingPolicy, VehicleStateStore};

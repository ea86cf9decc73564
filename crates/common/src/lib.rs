//! # Common
//!
//! Clients for the request/response services the tracker depends on: the
//! Fleet API (vehicle roster) and the Tracking API (last known positions and
//! sample ingestion).

pub mod fleet;
pub mod tracking;

pub use self::fleet::{FleetVehicle, Route};
pub use self::tracking::SampleSubmission;

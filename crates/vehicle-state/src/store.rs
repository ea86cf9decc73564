//! # Vehicle State Store
//!
//! In-memory table of per-vehicle tracking state. Entries are created only
//! from the registry; position updates may only modify existing entries.
//!
//! Each entry is guarded by its map shard lock, so a write to one vehicle is
//! atomic with respect to readers of that vehicle. Readers always receive
//! copies.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;

use crate::model::{PositionSample, VehicleId, VehicleIdentity, VehicleTrackState};

/// How updates for the same vehicle are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderingPolicy {
    /// Last write wins, by arrival order at the client.
    #[default]
    ArrivalOrder,

    /// Samples timestamped strictly before the stored update are dropped.
    RejectOlder,
}

impl FromStr for OrderingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arrival" | "arrival-order" => Ok(Self::ArrivalOrder),
            "timestamp" | "reject-older" => Ok(Self::RejectOlder),
            other => Err(format!("unknown ordering policy: {other}")),
        }
    }
}

/// Why an update was not applied.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    #[error("unknown vehicle")]
    UnknownVehicle,

    #[error("malformed sample: missing or invalid coordinates")]
    Malformed,

    #[error("stale sample: older than the stored update")]
    Stale,
}

/// Result of [`VehicleStateStore::apply_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Dropped(DropReason),
}

impl ApplyOutcome {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Shared handle to the vehicle table. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct VehicleStateStore {
    vehicles: Arc<DashMap<VehicleId, VehicleTrackState>>,
    ordering: OrderingPolicy,
}

impl VehicleStateStore {
    #[must_use]
    pub fn new(ordering: OrderingPolicy) -> Self {
        Self { vehicles: Arc::new(DashMap::new()), ordering }
    }

    #[must_use]
    pub const fn ordering(&self) -> OrderingPolicy {
        self.ordering
    }

    /// Create entries for registry vehicles not yet in the table.
    ///
    /// Existing entries are left untouched, so seeding again never discards
    /// data. Returns the number of entries created.
    pub fn seed(&self, identities: impl IntoIterator<Item = VehicleIdentity>) -> usize {
        let mut created = 0;
        for identity in identities {
            if identity.vehicle_id.is_empty() {
                continue;
            }
            if let Entry::Vacant(entry) = self.vehicles.entry(identity.vehicle_id.clone()) {
                entry.insert(VehicleTrackState::new(identity));
                created += 1;
            }
        }
        created
    }

    /// Merge a position sample into a known vehicle's state.
    pub fn apply_update(&self, vehicle_id: &VehicleId, sample: &PositionSample) -> ApplyOutcome {
        let Some(mut state) = self.vehicles.get_mut(vehicle_id) else {
            return ApplyOutcome::Dropped(DropReason::UnknownVehicle);
        };
        let Some((latitude, longitude)) = sample.coordinates() else {
            return ApplyOutcome::Dropped(DropReason::Malformed);
        };

        if self.ordering == OrderingPolicy::RejectOlder
            && let (Some(incoming), Some(current)) = (sample.timestamp, state.last_update_at)
            && incoming < current
        {
            return ApplyOutcome::Dropped(DropReason::Stale);
        }

        state.latitude = Some(latitude);
        state.longitude = Some(longitude);
        state.speed = sample.speed_kmh();
        if let Some(status) = &sample.status {
            state.status = status.clone();
        }
        state.last_update_at = Some(sample.timestamp.unwrap_or_else(Utc::now));
        state.has_data = true;

        ApplyOutcome::Applied
    }

    /// Copy of one vehicle's state.
    #[must_use]
    pub fn get(&self, vehicle_id: &VehicleId) -> Option<VehicleTrackState> {
        self.vehicles.get(vehicle_id).map(|state| state.value().clone())
    }

    #[must_use]
    pub fn contains(&self, vehicle_id: &VehicleId) -> bool {
        self.vehicles.contains_key(vehicle_id)
    }

    /// Copy of every vehicle's state, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<VehicleTrackState> {
        let mut states: Vec<VehicleTrackState> =
            self.vehicles.iter().map(|entry| entry.value().clone()).collect();
        states.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        states
    }

    /// Vehicles eligible for presentation (a real position has been applied).
    #[must_use]
    pub fn located(&self) -> Vec<VehicleTrackState> {
        self.snapshot().into_iter().filter(|state| state.has_data).collect()
    }

    /// Every known vehicle id, ordered.
    #[must_use]
    pub fn vehicle_ids(&self) -> Vec<VehicleId> {
        let mut ids: Vec<VehicleId> = self.vehicles.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

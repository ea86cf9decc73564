//! # Startup Loaders
//!
//! The registry load seeds the store and must finish before anything else
//! starts. The snapshot load then fills in last known positions; it runs in
//! the background alongside the live feed.

use anyhow::Result;
use common::{fleet, tracking};
use futures::future::join_all;
use realtime::{Config, HttpRequest};
use serde::Serialize;
use vehicle_state::{
    ApplyOutcome, DiagnosticLog, PositionSample, VehicleId, VehicleIdentity, VehicleStateStore,
};

/// Load the fleet roster. Any failure yields an empty roster.
pub async fn load_registry<P>(provider: &P, diagnostics: &DiagnosticLog) -> Vec<VehicleIdentity>
where
    P: Config + HttpRequest,
{
    match fleet::vehicles(provider).await {
        Ok(vehicles) => {
            tracing::info!(count = vehicles.len(), "loaded vehicle registry");
            diagnostics.append(format!("Loaded {} vehicles from registry", vehicles.len()));
            vehicles
        }
        Err(e) => {
            tracing::error!(
                monotonic_counter.registry_load_failed = 1,
                "failed to load vehicle registry: {e:#}"
            );
            diagnostics.append(format!("Vehicle registry unavailable: {e}"));
            Vec::new()
        }
    }
}

/// Outcome of a snapshot load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub requested: usize,
    pub applied: usize,
    /// No position known, or the known position was unusable.
    pub missing: usize,
    pub failed: usize,
}

/// Fetch the last known position of every vehicle in the store, all at once.
///
/// Each position is applied as soon as its own lookup returns, so a slow or
/// failing lookup never holds back the others. An unlocated vehicle simply
/// keeps its registry-only state.
pub async fn load_snapshots<P>(
    provider: &P, store: &VehicleStateStore, diagnostics: &DiagnosticLog,
) -> SnapshotSummary
where
    P: Config + HttpRequest,
{
    let vehicle_ids = store.vehicle_ids();
    let lookups = vehicle_ids.iter().map(|vehicle_id| async move {
        let result = tracking::latest_location(vehicle_id, provider).await;
        apply_snapshot(store, vehicle_id, result)
    });

    let mut summary = SnapshotSummary { requested: vehicle_ids.len(), ..SnapshotSummary::default() };
    for outcome in join_all(lookups).await {
        match outcome {
            SnapshotOutcome::Applied => summary.applied += 1,
            SnapshotOutcome::Missing => summary.missing += 1,
            SnapshotOutcome::Failed => summary.failed += 1,
        }
    }

    tracing::info!(?summary, "snapshot load complete");
    diagnostics.append(format!(
        "Snapshot loaded: {} of {} vehicles located, {} failed",
        summary.applied, summary.requested, summary.failed
    ));
    summary
}

enum SnapshotOutcome {
    Applied,
    Missing,
    Failed,
}

fn apply_snapshot(
    store: &VehicleStateStore, vehicle_id: &VehicleId, result: Result<Option<PositionSample>>,
) -> SnapshotOutcome {
    match result {
        Ok(Some(sample)) => match store.apply_update(vehicle_id, &sample) {
            ApplyOutcome::Applied => SnapshotOutcome::Applied,
            ApplyOutcome::Dropped(reason) => {
                tracing::debug!(%vehicle_id, %reason, "snapshot not applied");
                SnapshotOutcome::Missing
            }
        },
        Ok(None) => SnapshotOutcome::Missing,
        Err(e) => {
            tracing::warn!(
                monotonic_counter.snapshot_load_failed = 1,
                %vehicle_id,
                "failed to load last known position: {e:#}"
            );
            SnapshotOutcome::Failed
        }
    }
}

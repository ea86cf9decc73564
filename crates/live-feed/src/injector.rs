//! # Update Injector
//!
//! Operator tool for nudging a vehicle's position. The new position is
//! written to the store straight away and then submitted to the ingestion
//! endpoint in the background; when the broker echoes it back over the live
//! feed the store already holds the same coordinates.

use chrono::Utc;
use common::SampleSubmission;
use common::tracking;
use realtime::{Config, HttpRequest, Result, bad_request, not_found};
use tokio_util::task::TaskTracker;
use vehicle_state::{
    ApplyOutcome, DiagnosticLog, PositionSample, VehicleId, VehicleStateStore, VehicleStatus,
};

#[derive(Debug, Clone)]
pub struct UpdateInjector<P> {
    provider: P,
    store: VehicleStateStore,
    diagnostics: DiagnosticLog,
    submissions: TaskTracker,
}

impl<P> UpdateInjector<P>
where
    P: Config + HttpRequest + Clone + 'static,
{
    #[must_use]
    pub fn new(provider: P, store: VehicleStateStore, diagnostics: DiagnosticLog) -> Self {
        Self { provider, store, diagnostics, submissions: TaskTracker::new() }
    }

    /// Offset a vehicle's current position by the given deltas and report it
    /// at `speed` km/h.
    ///
    /// Returns the applied sample. The ingestion request is not awaited; its
    /// failure is logged and recorded in the diagnostic log.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a vehicle outside the registry and
    /// `BadRequest` for one without a position or when the result is not a
    /// valid position.
    pub fn inject_delta(
        &self, vehicle_id: &VehicleId, delta_lat: f64, delta_lng: f64, speed: f64,
    ) -> Result<PositionSample> {
        let Some(current) = self.store.get(vehicle_id) else {
            return Err(not_found!("vehicle {vehicle_id} is not tracked"));
        };
        let Some((latitude, longitude)) = current.position() else {
            return Err(bad_request!("vehicle {vehicle_id} has no position yet"));
        };

        let sample = PositionSample {
            latitude: Some(latitude + delta_lat),
            longitude: Some(longitude + delta_lng),
            speed: Some(speed),
            status: Some(VehicleStatus::Moving),
            timestamp: Some(Utc::now()),
        };
        if let ApplyOutcome::Dropped(reason) = self.store.apply_update(vehicle_id, &sample) {
            return Err(bad_request!("cannot inject update for vehicle {vehicle_id}: {reason}"));
        }

        let (latitude, longitude) = sample.coordinates().unwrap_or_default();
        tracing::info!(%vehicle_id, latitude, longitude, "injected update");
        self.diagnostics.append(format!(
            "Injected update for vehicle {vehicle_id}: {latitude:.5}, {longitude:.5}"
        ));

        let submission = SampleSubmission {
            vehicle_id: vehicle_id.clone(),
            latitude,
            longitude,
            speed: sample.speed_kmh(),
        };
        let provider = self.provider.clone();
        let diagnostics = self.diagnostics.clone();

        self.submissions.spawn(async move {
            if let Err(e) = tracking::send_sample(&submission, &provider).await {
                tracing::warn!(
                    monotonic_counter.injected_sample_failed = 1,
                    vehicle_id = %submission.vehicle_id,
                    "failed to submit injected sample: {e:#}"
                );
                diagnostics.append(format!(
                    "Submitting injected update for vehicle {} failed: {e}",
                    submission.vehicle_id
                ));
            }
        });

        Ok(sample)
    }

    /// Wait for in-flight submissions to finish.
    pub async fn settle(&self) {
        self.submissions.close();
        self.submissions.wait().await;
        self.submissions.reopen();
    }
}

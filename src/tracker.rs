//! # Tracker
//!
//! Composes the subsystem: registry load, store seeding, background snapshot
//! load, and the live feed client. One `Tracker` per subsystem lifetime; it is
//! cheap to clone and clones share everything.

use std::sync::{Arc, OnceLock};

use live_feed::{Channel, ConnectionState, LiveFeedClient, LiveFeedHandle, UpdateInjector};
use realtime::{Config, HttpRequest, Result};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use vehicle_state::{
    DiagnosticLog, LogEntry, PositionSample, VehicleId, VehicleStateStore, VehicleTrackState,
};

use crate::config::TrackerConfig;
use crate::loader::{self, SnapshotSummary};

#[derive(Clone)]
pub struct Tracker<P> {
    store: VehicleStateStore,
    diagnostics: DiagnosticLog,
    injector: UpdateInjector<P>,
    feed: LiveFeedHandle,
    snapshot_task: Arc<Mutex<Option<JoinHandle<SnapshotSummary>>>>,
    snapshot: Arc<OnceLock<SnapshotSummary>>,
}

/// Connection and coverage summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackerStatus {
    #[serde(flatten)]
    pub connection: ConnectionState,
    pub connected: bool,
    pub vehicles: usize,
    pub located: usize,
}

impl<P> Tracker<P>
where
    P: Config + HttpRequest + Clone + 'static,
{
    /// Start tracking.
    ///
    /// Returns once the registry has been loaded and the store seeded. The
    /// snapshot load and the live feed then proceed in the background.
    pub async fn start<C: Channel>(provider: P, channel: C, config: TrackerConfig) -> Self {
        let store = VehicleStateStore::new(config.ordering);
        let diagnostics = DiagnosticLog::new(config.diagnostic_capacity);

        let registry = loader::load_registry(&provider, &diagnostics).await;
        let seeded = store.seed(registry);
        tracing::info!(seeded, "vehicle state seeded from registry");

        let snapshot_task = {
            let provider = provider.clone();
            let store = store.clone();
            let diagnostics = diagnostics.clone();
            tokio::spawn(async move { loader::load_snapshots(&provider, &store, &diagnostics).await })
        };

        let feed = LiveFeedClient::new(channel, store.clone(), diagnostics.clone(), config.feed)
            .start();
        let injector = UpdateInjector::new(provider, store.clone(), diagnostics.clone());

        Self {
            store,
            diagnostics,
            injector,
            feed,
            snapshot_task: Arc::new(Mutex::new(Some(snapshot_task))),
            snapshot: Arc::new(OnceLock::new()),
        }
    }

    /// Wait for the startup snapshot load to finish.
    ///
    /// Returns `None` if the load was cancelled by shutdown.
    pub async fn snapshot_loaded(&self) -> Option<SnapshotSummary> {
        let task = self.snapshot_task.lock().await.take();
        if let Some(task) = task {
            match task.await {
                Ok(summary) => {
                    let _ = self.snapshot.set(summary);
                }
                Err(e) => tracing::warn!("snapshot load did not complete: {e}"),
            }
        }
        self.snapshot.get().copied()
    }

    /// Copies of every vehicle's state, ordered by id.
    #[must_use]
    pub fn vehicles(&self) -> Vec<VehicleTrackState> {
        self.store.snapshot()
    }

    /// Vehicles with a real position.
    #[must_use]
    pub fn located(&self) -> Vec<VehicleTrackState> {
        self.store.located()
    }

    #[must_use]
    pub fn vehicle(&self, vehicle_id: &VehicleId) -> Option<VehicleTrackState> {
        self.store.get(vehicle_id)
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.feed.connection_state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.feed.is_connected()
    }

    #[must_use]
    pub fn status(&self) -> TrackerStatus {
        let connection = self.connection_state();
        TrackerStatus {
            connection,
            connected: connection.is_connected(),
            vehicles: self.store.len(),
            located: self.store.located().len(),
        }
    }

    /// Diagnostic log entries, newest first.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<LogEntry> {
        self.diagnostics.entries()
    }

    #[must_use]
    pub const fn store(&self) -> &VehicleStateStore {
        &self.store
    }

    #[must_use]
    pub const fn feed(&self) -> &LiveFeedHandle {
        &self.feed
    }

    /// See [`UpdateInjector::inject_delta`].
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown vehicle and `BadRequest` for a
    /// vehicle without a position.
    pub fn inject_delta(
        &self, vehicle_id: &VehicleId, delta_lat: f64, delta_lng: f64, speed: f64,
    ) -> Result<PositionSample> {
        self.injector.inject_delta(vehicle_id, delta_lat, delta_lng, speed)
    }

    /// Stop the live feed, cancel an unfinished snapshot load, and wait for
    /// in-flight submissions.
    pub async fn shutdown(&self) {
        self.feed.shutdown().await;
        if let Some(task) = self.snapshot_task.lock().await.take() {
            task.abort();
        }
        self.injector.settle().await;
        tracing::info!("tracker stopped");
    }
}

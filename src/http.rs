//! # HTTP
//!
//! Read-only views of the tracker plus the operator injection endpoint.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use realtime::{Config, HttpError, HttpRequest};
use serde::Deserialize;
use vehicle_state::{LogEntry, PositionSample, VehicleId, VehicleTrackState};

use crate::tracker::{Tracker, TrackerStatus};

/// Routes for `tracker`.
pub fn router<P>(tracker: Tracker<P>) -> Router
where
    P: Config + HttpRequest + Clone + 'static,
{
    Router::new()
        .route("/tracking/vehicles", get(vehicles::<P>))
        .route("/tracking/status", get(status::<P>))
        .route("/tracking/diagnostics", get(diagnostics::<P>))
        .route("/tracking/vehicles/{vehicle_id}/inject", post(inject::<P>))
        .with_state(tracker)
}

#[derive(Debug, Default, Deserialize)]
struct VehicleQuery {
    #[serde(default)]
    located: bool,
}

async fn vehicles<P>(
    State(tracker): State<Tracker<P>>, Query(query): Query<VehicleQuery>,
) -> Json<Vec<VehicleTrackState>>
where
    P: Config + HttpRequest + Clone + 'static,
{
    if query.located { Json(tracker.located()) } else { Json(tracker.vehicles()) }
}

async fn status<P>(State(tracker): State<Tracker<P>>) -> Json<TrackerStatus>
where
    P: Config + HttpRequest + Clone + 'static,
{
    Json(tracker.status())
}

async fn diagnostics<P>(State(tracker): State<Tracker<P>>) -> Json<Vec<LogEntry>>
where
    P: Config + HttpRequest + Clone + 'static,
{
    Json(tracker.diagnostics())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InjectRequest {
    #[serde(default)]
    delta_lat: f64,
    #[serde(default)]
    delta_lng: f64,
    speed: f64,
}

async fn inject<P>(
    State(tracker): State<Tracker<P>>, Path(vehicle_id): Path<String>,
    Json(request): Json<InjectRequest>,
) -> Result<Json<PositionSample>, HttpError>
where
    P: Config + HttpRequest + Clone + 'static,
{
    let vehicle_id = VehicleId::new(vehicle_id);
    let sample =
        tracker.inject_delta(&vehicle_id, request.delta_lat, request.delta_lng, request.speed)?;
    Ok(Json(sample))
}

use anyhow::{Context, Result};
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{Method, StatusCode};
use http_body_util::{Empty, Full};
use realtime::{Config, HttpRequest, bad_gateway};
use serde::{Deserialize, Serialize};
use urlencoding::encode;
use vehicle_state::{PositionSample, VehicleId};

/// Retrieves the last known position of a vehicle from the Tracking API.
///
/// Returns `None` when the service has no position for the vehicle.
///
/// # Errors
///
/// Returns an error when the request fails, responds with an unexpected
/// status, or the response cannot be deserialized.
pub async fn latest_location<P>(
    vehicle_id: &VehicleId, provider: &P,
) -> Result<Option<PositionSample>>
where
    P: Config + HttpRequest,
{
    let url = tracking_url(provider).await?;

    let request = http::Request::builder()
        .method(Method::GET)
        .uri(format!("{url}/tracking/vehicles/{}/latest", encode(vehicle_id.as_str())))
        .header(ACCEPT, "application/json")
        .body(Empty::<Bytes>::new())
        .context("building latest location request")?;

    let response =
        HttpRequest::fetch(provider, request).await.context("Tracking API request failed")?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(bad_gateway!("Tracking API responded with {}", response.status()).into());
    }

    let body = response.into_body();
    if body.is_empty() {
        return Ok(None);
    }
    let sample: Option<PositionSample> =
        serde_json::from_slice(&body).context("deserializing latest location")?;

    Ok(sample)
}

/// A position submitted to the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleSubmission {
    pub vehicle_id: VehicleId,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
}

/// Submits a position sample to the Tracking API ingestion endpoint.
///
/// The service rebroadcasts accepted samples on the vehicle's live topic.
///
/// # Errors
///
/// Returns an error when the request fails or is not accepted.
pub async fn send_sample<P>(submission: &SampleSubmission, provider: &P) -> Result<()>
where
    P: Config + HttpRequest,
{
    let url = tracking_url(provider).await?;
    let payload = serde_json::to_vec(submission).context("serializing sample")?;

    let request = http::Request::builder()
        .method(Method::POST)
        .uri(format!(
            "{url}/tracking/vehicles/{}/samples",
            encode(submission.vehicle_id.as_str())
        ))
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(payload)))
        .context("building sample request")?;

    let response =
        HttpRequest::fetch(provider, request).await.context("Tracking API request failed")?;
    if !response.status().is_success() {
        return Err(bad_gateway!("sample rejected with {}", response.status()).into());
    }

    tracing::debug!(vehicle_id = %submission.vehicle_id, "sample accepted");
    Ok(())
}

async fn tracking_url<P: Config>(provider: &P) -> Result<String> {
    let url = Config::get(provider, "TRACKING_URL").await.context("getting `TRACKING_URL`")?;
    Ok(url.trim_end_matches('/').to_string())
}

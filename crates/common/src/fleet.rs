use std::collections::HashSet;

use anyhow::{Context, Result};
use bytes::Bytes;
use http::Method;
use http::header::{ACCEPT, CACHE_CONTROL};
use http_body_util::Empty;
use realtime::{Config, HttpRequest, bad_gateway};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vehicle_state::{VehicleId, VehicleIdentity};

/// Retrieves the fleet roster from the Fleet API.
///
/// Rows that are not valid vehicle records or have no id are skipped, and
/// duplicate ids keep the first row.
///
/// # Errors
///
/// Returns an error when the fleet API request fails, responds with a
/// non-success status, or the response cannot be deserialized.
pub async fn vehicles<P>(provider: &P) -> Result<Vec<VehicleIdentity>>
where
    P: Config + HttpRequest,
{
    let fleet_url = Config::get(provider, "FLEET_URL").await.context("getting `FLEET_URL`")?;
    let fleet_url = fleet_url.trim_end_matches('/');

    let request = http::Request::builder()
        .method(Method::GET)
        .uri(format!("{fleet_url}/vehicles"))
        .header(CACHE_CONTROL, "no-cache")
        .header(ACCEPT, "application/json")
        .body(Empty::<Bytes>::new())
        .context("building Fleet API request")?;

    let response =
        HttpRequest::fetch(provider, request).await.context("Fleet API request failed")?;
    if !response.status().is_success() {
        return Err(bad_gateway!("Fleet API responded with {}", response.status()).into());
    }

    let body = response.into_body();
    let rows: Vec<Value> =
        serde_json::from_slice(&body).context("Failed to deserialize Fleet API response")?;

    let mut seen = HashSet::new();
    let identities = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<FleetVehicle>(row) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("skipping Fleet API row: {e}");
                None
            }
        })
        .filter(|record| !record.id.is_empty() && seen.insert(record.id.clone()))
        .map(VehicleIdentity::from)
        .collect();

    Ok(identities)
}

/// Fleet API vehicle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetVehicle {
    pub id: VehicleId,
    #[serde(default, alias = "vehicleNumber", alias = "registration")]
    pub number: Option<String>,
    #[serde(default)]
    pub route: Option<Route>,
}

/// A route is sent either as a plain code or as a route object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Route {
    Label(String),
    Number(u64),
    Detail {
        #[serde(default, alias = "routeCode")]
        code: Option<String>,
        #[serde(default, alias = "routeName")]
        name: Option<String>,
    },
}

impl Route {
    #[must_use]
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Label(label) => Some(label.clone()),
            Self::Number(number) => Some(number.to_string()),
            Self::Detail { code, name } => code
                .as_deref()
                .filter(|code| !code.trim().is_empty())
                .or_else(|| name.as_deref().filter(|name| !name.trim().is_empty()))
                .map(ToString::to_string),
        }
    }
}

impl From<FleetVehicle> for VehicleIdentity {
    fn from(record: FleetVehicle) -> Self {
        let route = record.route.as_ref().and_then(Route::label);
        let number = record
            .number
            .filter(|number| !number.trim().is_empty())
            .unwrap_or_else(|| record.id.to_string());
        Self::new(record.id, number, route)
    }
}

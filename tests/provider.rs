#![allow(missing_docs)]

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use realtime::{Config, HttpRequest};
use serde_json::Value;

/// Fleet and Tracking API stand-in.
#[derive(Clone, Default)]
pub struct MockProvider {
    roster: Option<Value>,
    locations: HashMap<String, Value>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    submissions: Arc<Mutex<Vec<Value>>>,
}

#[allow(dead_code)]
impl MockProvider {
    #[must_use]
    pub fn new(roster: Value) -> Self {
        Self { roster: Some(roster), ..Self::default() }
    }

    /// Fleet API answers 503.
    #[must_use]
    pub fn registry_down() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_location(mut self, vehicle_id: &str, location: Value) -> Self {
        self.locations.insert(vehicle_id.to_string(), location);
        self
    }

    /// Snapshot lookups for `vehicle_id` answer 500.
    #[must_use]
    pub fn with_failing_location(mut self, vehicle_id: &str) -> Self {
        self.failing.insert(vehicle_id.to_string());
        self
    }

    /// Snapshot lookups for `vehicle_id` never answer.
    #[must_use]
    pub fn with_hanging_location(mut self, vehicle_id: &str) -> Self {
        self.hanging.insert(vehicle_id.to_string());
        self
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<Value> {
        self.submissions.lock().expect("should lock").clone()
    }
}

impl Config for MockProvider {
    async fn get(&self, key: &str) -> Result<String> {
        match key {
            "FLEET_URL" => Ok("http://fleet.local".to_string()),
            "TRACKING_URL" => Ok("http://tracking.local".to_string()),
            _ => Err(anyhow!("unknown config key: {key}")),
        }
    }
}

impl HttpRequest for MockProvider {
    async fn fetch<T>(&self, request: Request<T>) -> Result<Response<Bytes>>
    where
        T: http_body::Body + Any + Send,
        T::Data: Into<Vec<u8>> + Send,
        T::Error: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let collected = request.into_body().collect().await.map_err(Into::into);
        let body = collected.map_err(|e: Box<dyn Error + Send + Sync>| anyhow!(e))?.to_bytes();

        let (status, data) = match (method, path.as_str()) {
            (Method::GET, "/vehicles") => match &self.roster {
                Some(roster) => (StatusCode::OK, serde_json::to_vec(roster)?),
                None => (StatusCode::SERVICE_UNAVAILABLE, Vec::new()),
            },
            (Method::GET, path) if path.ends_with("/latest") => {
                let id = path
                    .trim_start_matches("/tracking/vehicles/")
                    .trim_end_matches("/latest")
                    .to_string();
                if self.hanging.contains(&id) {
                    std::future::pending::<()>().await;
                }
                if self.failing.contains(&id) {
                    (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
                } else if let Some(location) = self.locations.get(&id) {
                    (StatusCode::OK, serde_json::to_vec(location)?)
                } else {
                    (StatusCode::NOT_FOUND, Vec::new())
                }
            }
            (Method::POST, path) if path.ends_with("/samples") => {
                let submission: Value =
                    serde_json::from_slice(&body).context("deserializing submission")?;
                self.submissions.lock().map_err(|e| anyhow!("{e}"))?.push(submission);
                (StatusCode::ACCEPTED, Vec::new())
            }
            (_, path) => return Err(anyhow!("unknown path: {path}")),
        };

        Response::builder()
            .status(status)
            .body(Bytes::from(data))
            .context("failed to build response")
    }
}

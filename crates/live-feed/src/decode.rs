//! # Frame Decoding
//!
//! Turns live feed payloads into [`VehicleUpdate`]s. Publishers disagree on
//! where the vehicle id lives, so it is located by trying each extractor in
//! turn.

use serde_json::Value;
use thiserror::Error;
use vehicle_state::{PositionSample, VehicleId};

/// A decoded live feed message.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleUpdate {
    pub vehicle_id: VehicleId,
    pub sample: PositionSample,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("no vehicle id in payload")]
    MissingVehicleId,
    #[error("invalid position sample: {0}")]
    InvalidSample(String),
}

type Extractor = fn(&Value) -> Option<VehicleId>;

const EXTRACTORS: &[Extractor] = &[direct_id, nested_vehicle_id];

/// Decode a JSON payload.
///
/// # Errors
///
/// Returns an error when the payload is not JSON, carries no vehicle id, or
/// its position fields have the wrong types.
pub fn decode(payload: &[u8]) -> Result<VehicleUpdate, DecodeError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    let vehicle_id = EXTRACTORS
        .iter()
        .find_map(|extract| extract(&value))
        .ok_or(DecodeError::MissingVehicleId)?;
    let sample: PositionSample =
        serde_json::from_value(value).map_err(|e| DecodeError::InvalidSample(e.to_string()))?;

    Ok(VehicleUpdate { vehicle_id, sample })
}

// {"vehicleId": 1, ...}
fn direct_id(value: &Value) -> Option<VehicleId> {
    value.get("vehicleId").and_then(id_from_value)
}

// {"vehicle": {"id": 1}, ...}
fn nested_vehicle_id(value: &Value) -> Option<VehicleId> {
    value.get("vehicle")?.get("id").and_then(id_from_value)
}

fn id_from_value(value: &Value) -> Option<VehicleId> {
    let id = match value {
        Value::String(id) => VehicleId::new(id),
        Value::Number(id) => id
            .as_u64()
            .map(VehicleId::from)
            .or_else(|| id.as_i64().map(VehicleId::from))
            .or_else(|| id.as_f64().and_then(VehicleId::from_f64))?,
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

//! Tracking data model.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};

/// Route label used when the registry has no route for a vehicle.
pub const UNASSIGNED_ROUTE: &str = "unassigned";

/// Stable, opaque vehicle identifier.
///
/// The feed and the registry send ids either as JSON numbers or as strings;
/// both deserialize to the same value, so `1`, `1.0` and `"1"` identify the
/// same vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VehicleId(String);

impl VehicleId {
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_string())
    }

    /// Id for a fractional or out of range numeric id. Integral values keep
    /// their integer form. `None` for non-finite values.
    #[must_use]
    pub fn from_f64(id: f64) -> Option<Self> {
        id.is_finite().then(|| Self(id.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // numeric ids sort numerically, everything else after them by text
    fn sort_key(&self) -> (u8, u64, &str) {
        self.0.parse::<u64>().map_or((1, 0, self.0.as_str()), |n| (0, n, self.0.as_str()))
    }
}

impl Ord for VehicleId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for VehicleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for VehicleId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for VehicleId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for VehicleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VehicleId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl FromStr for VehicleId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Infallible> {
        Ok(Self::new(s))
    }
}

impl<'de> Deserialize<'de> for VehicleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Unsigned(u64),
            Signed(i64),
            Float(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Unsigned(id) => Ok(Self::from(id)),
            Raw::Signed(id) => Ok(Self::from(id)),
            Raw::Float(id) => Self::from_f64(id)
                .ok_or_else(|| de::Error::custom(format!("invalid vehicle id: {id}"))),
            Raw::Text(id) => Ok(Self::new(id)),
        }
    }
}

/// Static identity of a fleet vehicle, as loaded from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleIdentity {
    pub vehicle_id: VehicleId,
    pub display_number: String,
    pub route_label: String,
}

impl VehicleIdentity {
    #[must_use]
    pub fn new(
        vehicle_id: impl Into<VehicleId>, display_number: impl Into<String>,
        route_label: Option<String>,
    ) -> Self {
        let route_label = route_label
            .map(|route| route.trim().to_string())
            .filter(|route| !route.is_empty())
            .unwrap_or_else(|| UNASSIGNED_ROUTE.to_string());

        Self { vehicle_id: vehicle_id.into(), display_number: display_number.into(), route_label }
    }
}

/// Operational status of a vehicle.
///
/// Free-form status strings are classified by a case-insensitive prefix
/// match; anything unrecognised is kept verbatim so it can still be shown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VehicleStatus {
    Moving,
    Idle,
    #[default]
    Offline,
    Other(String),
}

impl VehicleStatus {
    const MOVING: [&'static str; 3] = ["MOV", "RUN", "DRIV"];
    const IDLE: [&'static str; 3] = ["IDLE", "STOP", "PARK"];
    const OFFLINE: [&'static str; 2] = ["OFF", "DISCONN"];

    /// Classify a raw status string from the feed.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_uppercase();
        let has_prefix = |prefixes: &[&str]| {
            !normalized.is_empty() && prefixes.iter().any(|p| normalized.starts_with(p))
        };

        if has_prefix(&Self::MOVING) {
            Self::Moving
        } else if has_prefix(&Self::IDLE) {
            Self::Idle
        } else if has_prefix(&Self::OFFLINE) {
            Self::Offline
        } else {
            Self::Other(raw.to_string())
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Moving => "MOVING",
            Self::Idle => "IDLE",
            Self::Offline => "OFFLINE",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for VehicleStatus {
    fn from(raw: String) -> Self {
        Self::classify(&raw)
    }
}

impl From<&str> for VehicleStatus {
    fn from(raw: &str) -> Self {
        Self::classify(raw)
    }
}

impl From<VehicleStatus> for String {
    fn from(status: VehicleStatus) -> Self {
        match status {
            VehicleStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// A single position report, from the snapshot service or the live feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    #[serde(default, alias = "lat")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "lng", alias = "lon")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub status: Option<VehicleStatus>,
    #[serde(default, with = "timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PositionSample {
    /// Latitude and longitude, when both are present, finite, and in range.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let latitude = self.latitude.filter(|lat| lat.is_finite() && (-90.0..=90.0).contains(lat))?;
        let longitude =
            self.longitude.filter(|lng| lng.is_finite() && (-180.0..=180.0).contains(lng))?;
        Some((latitude, longitude))
    }

    /// Speed in km/h; missing, negative, or non-finite values read as 0.
    #[must_use]
    pub fn speed_kmh(&self) -> f64 {
        self.speed.filter(|speed| speed.is_finite()).map_or(0.0, |speed| speed.max(0.0))
    }
}

/// Tracking state for one fleet vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleTrackState {
    pub vehicle_id: VehicleId,
    pub display_number: String,
    pub route_label: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: f64,
    pub status: VehicleStatus,
    #[serde(with = "timestamp")]
    pub last_update_at: Option<DateTime<Utc>>,
    pub has_data: bool,
}

impl VehicleTrackState {
    /// A registry-only entry: known, never located.
    #[must_use]
    pub fn new(identity: VehicleIdentity) -> Self {
        Self {
            vehicle_id: identity.vehicle_id,
            display_number: identity.display_number,
            route_label: identity.route_label,
            latitude: None,
            longitude: None,
            speed: 0.0,
            status: VehicleStatus::Offline,
            last_update_at: None,
            has_data: false,
        }
    }

    /// Current position, only once real data has been applied.
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64)> {
        if !self.has_data {
            return None;
        }
        self.latitude.zip(self.longitude)
    }
}

/// Serde helpers for optional timestamps sent as RFC 3339 strings or unix
/// seconds/milliseconds.
pub mod timestamp {
    use std::fmt;

    use chrono::{DateTime, Utc};
    use serde::de::{Error as DeError, Unexpected, Visitor};
    use serde::{Deserializer, Serializer};

    // values this large are milliseconds (seconds would be past year 5000)
    const MILLIS_THRESHOLD: i64 = 100_000_000_000;

    /// Serialize as an RFC 3339 string.
    ///
    /// # Errors
    ///
    /// Returns the serializer's error.
    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize from an RFC 3339 string, a numeric string, or a number.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is not a recognisable timestamp.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_option(OptTsVisitor)
    }

    fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
        if value.abs() >= MILLIS_THRESHOLD {
            DateTime::from_timestamp_millis(value)
        } else {
            DateTime::from_timestamp(value, 0)
        }
    }

    struct OptTsVisitor;

    impl<'de> Visitor<'de> for OptTsVisitor {
        type Value = Option<DateTime<Utc>>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a timestamp as RFC3339 string or unix seconds/milliseconds")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(None)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(OptTsVisitor)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(from_epoch(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            match i64::try_from(value) {
                Ok(value) => Ok(from_epoch(value)),
                Err(_) => Err(DeError::invalid_value(Unexpected::Unsigned(value), &self)),
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            if !value.is_finite() {
                return Err(DeError::invalid_value(Unexpected::Float(value), &self));
            }
            if value.abs() >= MILLIS_THRESHOLD as f64 {
                return Ok(DateTime::from_timestamp_millis(value as i64));
            }
            Ok(DateTime::from_timestamp_millis((value * 1000.0) as i64))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            let value = value.trim();
            if value.is_empty() {
                return Ok(None);
            }

            if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
                return Ok(Some(dt.with_timezone(&Utc)));
            }

            if let Ok(epoch) = value.parse::<i64>() {
                return Ok(from_epoch(epoch));
            }

            Err(DeError::invalid_value(Unexpected::Str(value), &self))
        }
    }
}

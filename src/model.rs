//! Core data types for the SquidSailing forecast adapter.
//!
//! This module defines the shared domain model imported by all other modules.
//! It contains no I/O and no conversion logic, only types and the small
//! accessors that keep their invariants in one place.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::units::ConversionError;

// ---------------------------------------------------------------------------
// Feature groups
// ---------------------------------------------------------------------------

/// A forecast API variable family.
///
/// Each group is requested as one entry of the `variables=` query parameter
/// and is switched on by one boolean in the `[variables]` configuration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureGroup {
    Wind,
    Temperature,
    Humidity,
    Pressure,
    Clouds,
    Storm,
    Precipitation,
    Snow,
    Sea,
}

impl FeatureGroup {
    /// All groups in the order they are requested from the API.
    pub const ALL: [FeatureGroup; 9] = [
        FeatureGroup::Wind,
        FeatureGroup::Temperature,
        FeatureGroup::Humidity,
        FeatureGroup::Pressure,
        FeatureGroup::Clouds,
        FeatureGroup::Storm,
        FeatureGroup::Precipitation,
        FeatureGroup::Snow,
        FeatureGroup::Sea,
    ];

    /// Name of the variable as the forecast API expects it.
    pub fn variable_name(&self) -> &'static str {
        match self {
            FeatureGroup::Wind => "wind",
            FeatureGroup::Temperature => "temperature",
            FeatureGroup::Humidity => "humidity",
            FeatureGroup::Pressure => "pressure",
            FeatureGroup::Clouds => "clouds",
            FeatureGroup::Storm => "storm",
            FeatureGroup::Precipitation => "precipitation",
            FeatureGroup::Snow => "snow",
            FeatureGroup::Sea => "sea",
        }
    }
}

impl fmt::Display for FeatureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.variable_name())
    }
}

/// Which forecast entry a measurement is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Index 0 of the forecast array, republished as a current reading.
    Current,
    /// The configured forecast offset.
    Forecast,
}

// ---------------------------------------------------------------------------
// Measurement definitions
// ---------------------------------------------------------------------------

/// One physical quantity the adapter can publish.
///
/// Definitions live in `measurements::MEASUREMENTS` and are never mutated.
#[derive(Debug, PartialEq)]
pub struct MeasurementDefinition {
    /// Output path, e.g. `environment.forecast.wind.speed`.
    pub output_path: &'static str,
    /// Field key in each forecast entry and in the response metadata.
    pub source_key: &'static str,
    /// Unit every emitted value is converted to. `None` for unitless values.
    pub canonical_unit: Option<&'static str>,
    pub description: &'static str,
    pub group: FeatureGroup,
    pub slot: Slot,
    /// Also enabled by the `current` flag when the group flag is off.
    pub follows_current: bool,
    /// Field may be absent from the API metadata; conversion is then skipped.
    pub beta: bool,
    /// Sea-level value is reduced to station altitude before emission.
    pub station_corrected: bool,
}

// ---------------------------------------------------------------------------
// Runtime values
// ---------------------------------------------------------------------------

/// Presence-tagged value of an active output.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OutputValue {
    /// Not fetched yet, or the field was absent from the last response.
    /// Pending values are not emitted.
    #[default]
    Pending,
    /// Known to be unavailable for the current cycle. Emitted as `null`.
    Null,
    Number(f64),
}

impl OutputValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OutputValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, OutputValue::Pending)
    }

    /// JSON form for emission; `None` when the value must not be emitted.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            OutputValue::Pending => None,
            OutputValue::Null => Some(Value::Null),
            OutputValue::Number(v) => Some(Value::from(*v)),
        }
    }
}

/// A measurement enabled by configuration together with its latest value.
///
/// Owned exclusively by the orchestrator; created once at resolution time.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveOutput {
    pub definition: &'static MeasurementDefinition,
    pub value: OutputValue,
}

impl ActiveOutput {
    pub fn new(definition: &'static MeasurementDefinition) -> Self {
        Self {
            definition,
            value: OutputValue::Pending,
        }
    }

    pub fn path(&self) -> &'static str {
        self.definition.output_path
    }
}

// ---------------------------------------------------------------------------
// Latest state
// ---------------------------------------------------------------------------

/// Last known vessel position. Either coordinate may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
        }
    }

    /// `(lat, lon)` when both coordinates are present.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.coordinates().is_some()
    }
}

/// Timestamp and timezone of the forecast slot published last.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForecastStamp {
    /// Unix seconds of the selected slot; `None` when the forecast was too short.
    pub time: Option<i64>,
    pub timezone: Option<String>,
}

/// Mutable snapshot owned by one orchestrator instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LatestState {
    /// When the last fetch was decided, not when it completed.
    pub last_update: Option<DateTime<Utc>>,
    pub position: Position,
    /// Station elevation in meters above sea level. 0 when unknown.
    pub elevation_m: f64,
    pub forecast: ForecastStamp,
    /// Set while the cached API metadata (units per field) covers every
    /// active output; requests then stop asking for it.
    pub metadata_loaded: bool,
}

// ---------------------------------------------------------------------------
// Fetch parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizonUnit {
    Hours,
    Days,
}

impl fmt::Display for HorizonUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HorizonUnit::Hours => write!(f, "h"),
            HorizonUnit::Days => write!(f, "d"),
        }
    }
}

/// Total forecast duration requested from the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Horizon {
    pub value: u32,
    pub unit: HorizonUnit,
}

impl Horizon {
    pub fn hours(value: u32) -> Self {
        Self {
            value,
            unit: HorizonUnit::Hours,
        }
    }
}

/// Renders as the API's `horizon=` value, e.g. `48,h`.
impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.value, self.unit)
    }
}

/// Everything needed to build a forecast request except the position.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchParameters {
    pub token: String,
    /// Requested variables, deduplicated, in insertion order.
    pub variables: Vec<FeatureGroup>,
    pub horizon: Horizon,
    /// Forecast slot index, always within `1..=96`.
    pub offset: usize,
    pub exclude_metadata: bool,
}

impl FetchParameters {
    /// Comma-separated `variables=` value.
    pub fn variables_param(&self) -> String {
        self.variables
            .iter()
            .map(|g| g.variable_name())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `exclude=` value. Metadata is only requested until it has been cached.
    pub fn exclude_param(&self) -> &'static str {
        if self.exclude_metadata {
            "minute,metadata"
        } else {
            "minute"
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that end a single fetch cycle.
///
/// None of these are fatal to the process; the orchestrator logs them and
/// waits for the next throttle-driven trigger.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ForecastError {
    /// Non-2xx HTTP response from the forecast API.
    #[error("HTTP error: {0}")]
    HttpError(u16),
    /// The request could not be sent or the body could not be read.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The response body could not be deserialized.
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),
}

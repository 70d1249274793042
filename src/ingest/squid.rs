//! SquidSailing (Great Circle) Forecast API client
//!
//! Builds forecast requests for a single position and decodes the hourly
//! forecast response, including the per-field unit metadata.
//!
//! API Documentation: https://www.squid-sailing.com/doc-api/forecast

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::model::{FetchParameters, ForecastError};

pub const FORECAST_API: &str = "https://front-remora.greatcircle.be/forecast";

// ============================================================================
// API Response Structures
// ============================================================================

/// Forecast response for one position
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForecastResponse {
    /// Position the API snapped the request to
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    /// Hourly entries; index 0 is the current hour
    #[serde(default)]
    pub forecast: Vec<ForecastSlot>,
    /// Unit per field key. Only present when metadata was not excluded.
    pub metadata: Option<HashMap<String, FieldMetadata>>,
    /// Warnings, e.g. variables unavailable for this area
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
}

/// Single hourly forecast entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForecastSlot {
    pub timestamp: SlotTimestamp,
    /// Field key to raw value (number or null)
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SlotTimestamp {
    pub unix: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldMetadata {
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiMessage {
    pub message: String,
}

/// Raw state of one field in a forecast entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawField {
    /// Key not present in the entry
    Absent,
    /// Present but null or not a number
    Null,
    Number(f64),
}

impl ForecastSlot {
    pub fn field(&self, key: &str) -> RawField {
        match self.fields.get(key) {
            None => RawField::Absent,
            Some(v) => v.as_f64().map(RawField::Number).unwrap_or(RawField::Null),
        }
    }
}

// ============================================================================
// Request Construction
// ============================================================================

/// Builds the forecast request URL for one position.
pub fn build_forecast_url(
    endpoint: &str,
    params: &FetchParameters,
    latitude: f64,
    longitude: f64,
) -> String {
    format!(
        "{}?token={}&longitude={}&latitude={}&variables={}&horizon={}&exclude={}&extend=hour",
        endpoint,
        params.token,
        longitude,
        latitude,
        params.variables_param(),
        params.horizon,
        params.exclude_param()
    )
}

/// Parses a forecast response body.
pub fn parse_forecast_response(body: &str) -> Result<ForecastResponse, ForecastError> {
    serde_json::from_str(body).map_err(|e| ForecastError::ParseError(e.to_string()))
}

// ============================================================================
// Transport
// ============================================================================

/// Black-box request/response function used by the orchestrator.
pub trait ForecastTransport {
    fn fetch(&self, url: &str) -> Result<ForecastResponse, ForecastError>;
}

/// Blocking HTTP transport with a per-request timeout
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ForecastError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForecastError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl ForecastTransport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<ForecastResponse, ForecastError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .send()
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(ForecastError::HttpError(response.status().as_u16()));
        }

        let body = response.text().map_err(transport_error)?;
        parse_forecast_response(&body)
    }
}

fn transport_error(err: reqwest::Error) -> ForecastError {
    // The token travels in the query string; keep it out of the logs
    let err = err.without_url();
    if err.is_timeout() {
        ForecastError::Transport(format!("request timed out: {}", err))
    } else {
        ForecastError::Transport(err.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

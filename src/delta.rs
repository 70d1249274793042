//! Host message formats.
//!
//! Inbound: batched `{ updates: [ { values: [ {path, value}, ... ] } ] }`
//! samples for the subscribed navigation paths.
//! Outbound: the same envelope carrying either `values` (one per fetch cycle)
//! or `meta` (once at start).

use std::io::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const NAVIGATION_POSITION: &str = "navigation.position";
pub const NAVIGATION_ELEVATION: &str = "navigation.gnss.antennaAltitude";

/// Label attached to every outbound message.
pub const SOURCE_LABEL: &str = "squid-sailing-signalk";

// ---------------------------------------------------------------------------
// Path/value pairs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    pub path: String,
    #[serde(default)]
    pub value: Value,
}

impl PathValue {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeltaBatch {
    #[serde(default)]
    pub updates: Vec<DeltaUpdate>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeltaUpdate {
    #[serde(default)]
    pub values: Vec<PathValue>,
}

impl DeltaBatch {
    /// A batch holding a single sample.
    pub fn single(path: &str, value: Value) -> Self {
        Self {
            updates: vec![DeltaUpdate {
                values: vec![PathValue::new(path, value)],
            }],
        }
    }

    /// All samples across updates, in delivery order.
    pub fn samples(&self) -> impl Iterator<Item = &PathValue> {
        self.updates.iter().flat_map(|u| u.values.iter())
    }
}

/// `navigation.position` payload. Missing coordinates deserialize as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct PositionSample {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Report on every change, no more often than `min_period`.
    Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub path: &'static str,
    pub period: Duration,
    pub policy: Policy,
    pub min_period: Duration,
}

/// The two host subscriptions. Position is throttled to the refresh interval,
/// elevation to one minute.
pub fn subscriptions(refresh: Duration) -> Vec<Subscription> {
    vec![
        Subscription {
            path: NAVIGATION_POSITION,
            period: refresh,
            policy: Policy::Instant,
            min_period: refresh,
        },
        Subscription {
            path: NAVIGATION_ELEVATION,
            period: refresh,
            policy: Policy::Instant,
            min_period: Duration::from_secs(60),
        },
    ]
}

// ---------------------------------------------------------------------------
// Outbound channel
// ---------------------------------------------------------------------------

/// Delivery channel back to the host.
pub trait MessageSink {
    fn send_values(&mut self, values: Vec<PathValue>) -> Result<(), Box<dyn std::error::Error>>;
    fn send_meta(&mut self, meta: Vec<PathValue>) -> Result<(), Box<dyn std::error::Error>>;
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    source: &'a str,
    updates: [Update; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum Update {
    Values(Vec<PathValue>),
    Meta(Vec<PathValue>),
}

/// Writes one JSON envelope per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, update: Update) -> Result<(), Box<dyn std::error::Error>> {
        let envelope = Envelope {
            source: SOURCE_LABEL,
            updates: [update],
        };
        serde_json::to_writer(&mut self.writer, &envelope)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> MessageSink for JsonLinesSink<W> {
    fn send_values(&mut self, values: Vec<PathValue>) -> Result<(), Box<dyn std::error::Error>> {
        self.write(Update::Values(values))
    }

    fn send_meta(&mut self, meta: Vec<PathValue>) -> Result<(), Box<dyn std::error::Error>> {
        self.write(Update::Meta(meta))
    }
}

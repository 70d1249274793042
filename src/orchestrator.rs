//! Forecast fetch and update orchestration.
//!
//! One [`Orchestrator`] owns all runtime state: the latest position and
//! elevation, the cached API metadata, and the active outputs. It reacts to
//! host samples and timer ticks, decides whether a fetch is due, converts the
//! response into canonical units, and emits path/value pairs.
//!
//! # Clock injection
//! Every time-dependent entry point takes a `now: DateTime<Utc>` parameter
//! rather than calling `Utc::now()` internally, so throttling is deterministic
//! in tests.
//!
//! # Throttling
//! `last_update` is stamped when a fetch is *decided*, before the request is
//! sent. A second trigger within the refresh interval therefore never issues
//! a second request, whether or not the first one succeeded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::delta::{DeltaBatch, MessageSink, NAVIGATION_ELEVATION, NAVIGATION_POSITION, PathValue, PositionSample};
use crate::ingest::squid::{FORECAST_API, FieldMetadata, ForecastResponse, ForecastSlot, ForecastTransport, RawField, build_forecast_url};
use crate::logging::{Component, LogSink, log_fetch_failure};
use crate::measurements::FORECAST_TIME_PATH;
use crate::model::{
    ActiveOutput, FeatureGroup, FetchParameters, ForecastError, LatestState, MeasurementDefinition, OutputValue,
    Position, Slot,
};
use crate::resolver::{Resolution, ResolvedConfig};
use crate::summary::ForecastSummary;
use crate::units::{self, Converted, UNIX_DATE};

/// Prefix of the elevation string the host reports while the GNSS fix is
/// still pending, e.g. `"waiting ..."`.
pub const ELEVATION_PENDING: &str = "waiting";

pub const DEFAULT_REFRESH: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorOptions {
    pub endpoint: String,
    /// Minimum time between two fetch cycles; also the metadata timeout.
    pub refresh: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            endpoint: FORECAST_API.to_string(),
            refresh: DEFAULT_REFRESH,
        }
    }
}

pub struct Orchestrator {
    config: Option<ResolvedConfig>,
    params: Option<FetchParameters>,
    outputs: Vec<ActiveOutput>,
    latest: LatestState,
    metadata: Option<HashMap<String, FieldMetadata>>,
    /// Fields already reported as lacking unit metadata.
    missing_metadata: HashSet<&'static str>,
    options: OrchestratorOptions,
    transport: Box<dyn ForecastTransport>,
    sink: Box<dyn MessageSink>,
    log: Box<dyn LogSink>,
    alive: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        resolution: Resolution,
        options: OrchestratorOptions,
        transport: Box<dyn ForecastTransport>,
        sink: Box<dyn MessageSink>,
        log: Box<dyn LogSink>,
    ) -> Self {
        let (config, params, outputs) = match resolution {
            Resolution::Enabled(cfg) => {
                let params = cfg.fetch_parameters();
                let outputs = cfg.outputs.iter().map(|def| ActiveOutput::new(def)).collect();
                (Some(cfg), Some(params), outputs)
            }
            Resolution::Disabled => (None, None, Vec::new()),
        };

        Self {
            config,
            params,
            outputs,
            latest: LatestState::default(),
            metadata: None,
            missing_metadata: HashSet::new(),
            options,
            transport,
            sink,
            log,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Shared liveness flag. Clearing it from another thread (e.g. a signal
    /// handler) makes the orchestrator discard any response still in flight.
    pub fn liveness(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    pub fn latest(&self) -> &LatestState {
        &self.latest
    }

    pub fn outputs(&self) -> &[ActiveOutput] {
        &self.outputs
    }

    pub fn fetch_parameters(&self) -> Option<&FetchParameters> {
        self.params.as_ref()
    }

    pub fn log(&self) -> &dyn LogSink {
        self.log.as_ref()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Announces metadata for every active output. No-op when disabled.
    pub fn start(&mut self) {
        let Some(config) = &self.config else {
            return;
        };
        let meta = config.meta_entries(self.options.refresh);
        if !meta.is_empty() {
            if let Err(e) = self.sink.send_meta(meta) {
                self.log.error(Component::Host, &format!("Failed to send metadata: {}", e));
            }
        }
        self.log.info(
            Component::System,
            &format!(
                "Interval started, refresh rate {}min",
                self.options.refresh.as_secs() / 60
            ),
        );
    }

    pub fn stop(&mut self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.log.info(Component::System, "Forecast updates stopped");
        }
    }

    // -----------------------------------------------------------------------
    // Inbound samples
    // -----------------------------------------------------------------------

    /// Dispatches a batch of host samples. Ignored when forecasts are disabled.
    pub fn on_deltas_at(&mut self, batch: &DeltaBatch, now: DateTime<Utc>) {
        if !self.is_enabled() || !self.is_alive() {
            return;
        }
        for sample in batch.samples() {
            match sample.path.as_str() {
                NAVIGATION_POSITION => self.on_position_at(&sample.value, now),
                NAVIGATION_ELEVATION => self.on_elevation(&sample.value),
                _ => {}
            }
        }
    }

    /// Records the position, then fetches if a cycle is due.
    pub fn on_position_at(&mut self, value: &Value, now: DateTime<Utc>) {
        if value.is_null() {
            self.log.warn(Component::Host, "PositionUpdate: Cannot add null value");
            return;
        }
        let sample: PositionSample = match serde_json::from_value(value.clone()) {
            Ok(sample) => sample,
            Err(e) => {
                self.log.warn(Component::Host, &format!("PositionUpdate: ignoring malformed value: {}", e));
                return;
            }
        };
        self.latest.position = Position {
            latitude: sample.latitude,
            longitude: sample.longitude,
        };
        self.evaluate_at(now);
    }

    /// Records the station elevation. Unknown elevations count as sea level.
    pub fn on_elevation(&mut self, value: &Value) {
        match value {
            Value::Null => {
                self.log.info(Component::Host, "Cannot add null value as elevation - using 0 instead");
                self.latest.elevation_m = 0.0;
            }
            Value::String(s) if s.starts_with(ELEVATION_PENDING) => {
                self.latest.elevation_m = 0.0;
            }
            other => match other.as_f64() {
                Some(elevation) => {
                    self.latest.elevation_m = elevation;
                    self.log.info(
                        Component::Host,
                        &format!("Elevation set to {}m above sea level", elevation),
                    );
                }
                None => {
                    self.log.warn(
                        Component::Host,
                        &format!("Elevation value {} is not a number - using 0 instead", other),
                    );
                    self.latest.elevation_m = 0.0;
                }
            },
        }
    }

    /// Periodic re-evaluation with the last known position.
    pub fn on_tick_at(&mut self, now: DateTime<Utc>) {
        if !self.is_enabled() || !self.is_alive() {
            return;
        }
        self.evaluate_at(now);
    }

    // -----------------------------------------------------------------------
    // Throttle
    // -----------------------------------------------------------------------

    /// Returns `true` if the last fetch decision is at most one refresh
    /// interval old. A clock that went backwards counts as within.
    pub fn last_update_within_at(&self, now: DateTime<Utc>) -> bool {
        match self.latest.last_update {
            None => false,
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed <= self.options.refresh,
                Err(_) => true,
            },
        }
    }

    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        self.is_enabled() && !self.last_update_within_at(now) && self.latest.position.is_valid()
    }

    /// The single "is a fetch due" decision shared by samples and ticks.
    /// Returns `true` if a request was issued.
    pub fn evaluate_at(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_due_at(now) {
            return false;
        }
        let Some((lat, lon)) = self.latest.position.coordinates() else {
            return false;
        };
        self.latest.last_update = Some(now);
        self.log.info(Component::Fetch, &format!("SquidSailing Coordinates {},{}", lat, lon));
        self.run_cycle(lat, lon);
        true
    }

    // -----------------------------------------------------------------------
    // Fetch cycle
    // -----------------------------------------------------------------------

    fn run_cycle(&mut self, lat: f64, lon: f64) {
        let Some(params) = self.params.as_mut() else {
            return;
        };
        params.exclude_metadata = self.latest.metadata_loaded;
        let url = build_forecast_url(&self.options.endpoint, params, lat, lon);

        let result = self.transport.fetch(&url);
        if !self.is_alive() {
            self.log.debug(Component::Fetch, "Discarding forecast response received after shutdown");
            return;
        }

        let outcome = result.and_then(|response| self.apply_response(response));
        match outcome {
            Ok(summary) => {
                self.log.debug(Component::Fetch, &summary.to_json_string());
                self.emit_values();
            }
            Err(e) => log_fetch_failure(self.log.as_ref(), "Forecast update", &e),
        }
    }

    /// Folds a forecast response into the latest state and active outputs.
    ///
    /// Upstream warnings are logged and processing continues. Fields without
    /// unit metadata are published as `null`. A conversion error aborts the
    /// cycle and leaves the latest state and output values untouched.
    pub fn apply_response(&mut self, response: ForecastResponse) -> Result<ForecastSummary, ForecastError> {
        let offset = self.params.as_ref().map(|p| p.offset).unwrap_or(1);

        for warning in &response.errors {
            self.log.warn(Component::Fetch, &warning.message);
        }

        let usable = response.forecast.len() > offset;
        let time = usable.then(|| response.forecast[offset].timestamp.unix);

        let mut values = if usable {
            let cached = self.metadata.as_ref();
            let fresh = response.metadata.as_ref();
            self.outputs
                .iter()
                .map(|o| {
                    let key = o.definition.source_key;
                    let field = cached
                        .and_then(|m| m.get(key))
                        .or_else(|| fresh.and_then(|m| m.get(key)));
                    read_output(o.definition, &response.forecast, offset, field)
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            vec![OutputValue::Null; self.outputs.len()]
        };

        let outside_temperature = self
            .outputs
            .iter()
            .zip(&values)
            .find(|(o, _)| o.definition.slot == Slot::Current && o.definition.group == FeatureGroup::Temperature)
            .and_then(|(_, v)| v.as_f64());
        for (output, value) in self.outputs.iter().zip(values.iter_mut()) {
            if let (true, OutputValue::Number(pressure)) = (output.definition.station_corrected, *value) {
                *value = OutputValue::Number(units::to_station_altitude(
                    pressure,
                    self.latest.elevation_m,
                    outside_temperature,
                ));
            }
        }

        // nothing below can fail
        if let Some(lat) = response.latitude {
            self.latest.position.latitude = Some(lat);
        }
        if let Some(lon) = response.longitude {
            self.latest.position.longitude = Some(lon);
        }
        self.latest.forecast.time = time;
        self.latest.forecast.timezone = response.timezone;

        let initial = self.metadata.is_none() && response.metadata.is_some();
        if let Some(fresh) = response.metadata {
            self.metadata.get_or_insert_with(HashMap::new).extend(fresh);
        }
        self.latest.metadata_loaded = self.warn_missing_metadata();

        let mut summary = ForecastSummary::new(self.latest.forecast.time, initial);
        for (output, value) in self.outputs.iter_mut().zip(values) {
            output.value = value;
            if let Some(json) = value.to_json() {
                summary.insert(output.path(), json);
            }
        }
        Ok(summary)
    }

    /// Returns `true` when the cached metadata covers every active non-beta
    /// output. Each uncovered field is warned about once.
    fn warn_missing_metadata(&mut self) -> bool {
        let Some(metadata) = &self.metadata else {
            return false;
        };
        let mut complete = true;
        for output in &self.outputs {
            let key = output.definition.source_key;
            if output.definition.beta || metadata.contains_key(key) {
                continue;
            }
            complete = false;
            if self.missing_metadata.insert(key) {
                self.log.warn(
                    Component::Fetch,
                    &format!("No unit metadata for field '{}' - publishing null", key),
                );
            }
        }
        complete
    }

    /// Path/value pairs for the last applied cycle: the forecast time first,
    /// then every output that has a value.
    pub fn pending_values(&self) -> Vec<PathValue> {
        let mut values = Vec::with_capacity(self.outputs.len() + 1);
        values.push(PathValue::new(FORECAST_TIME_PATH, self.forecast_time_value()));
        values.extend(
            self.outputs
                .iter()
                .filter_map(|o| o.value.to_json().map(|v| PathValue::new(o.path(), v))),
        );
        values
    }

    fn forecast_time_value(&self) -> Value {
        let Some(time) = self.latest.forecast.time else {
            return Value::Null;
        };
        match units::convert(UNIX_DATE, time as f64) {
            Ok(Converted::Timestamp(iso)) => Value::String(iso),
            Ok(Converted::Number(n)) => Value::from(n),
            Err(e) => {
                self.log.warn(Component::Fetch, &format!("Forecast time {}: {}", time, e));
                Value::Null
            }
        }
    }

    fn emit_values(&mut self) {
        let values = self.pending_values();
        let count = values.len();
        match self.sink.send_values(values) {
            Ok(()) => self.log.debug(Component::Host, &format!("Published {} forecast values", count)),
            Err(e) => self.log.error(Component::Host, &format!("Failed to send forecast values: {}", e)),
        }
    }
}

/// Reads one definition from the forecast and converts it to canonical units.
/// A field without metadata has no known unit and reads as `Null`.
fn read_output(
    def: &MeasurementDefinition,
    forecast: &[ForecastSlot],
    offset: usize,
    metadata: Option<&FieldMetadata>,
) -> Result<OutputValue, ForecastError> {
    let Some(field) = metadata else {
        return Ok(OutputValue::Null);
    };
    let unit = field.unit.as_deref();

    let index = match def.slot {
        Slot::Current => 0,
        Slot::Forecast => offset,
    };
    let raw = match forecast.get(index).map(|slot| slot.field(def.source_key)) {
        None | Some(RawField::Absent) => return Ok(OutputValue::Pending),
        Some(RawField::Null) => return Ok(OutputValue::Null),
        Some(RawField::Number(v)) => v,
    };

    let value = match (unit, def.canonical_unit) {
        (Some(from), Some(to)) => units::convert_to(from, to, raw)?,
        // unitless on either side: passed through unchanged
        _ => raw,
    };
    Ok(OutputValue::Number(value))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

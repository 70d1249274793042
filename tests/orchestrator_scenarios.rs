//! Orchestrator Scenario Tests
//!
//! End-to-end fetch cycles against a scripted transport: throttling, first
//! load vs. cached metadata, emission shape, and failure handling. No network
//! access required.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};

use squid_forecast::delta::{DeltaBatch, MessageSink, NAVIGATION_ELEVATION, NAVIGATION_POSITION, PathValue};
use squid_forecast::ingest::squid::{ForecastResponse, ForecastTransport, parse_forecast_response};
use squid_forecast::logging::{LogLevel, MemorySink};
use squid_forecast::model::{FeatureGroup, ForecastError};
use squid_forecast::orchestrator::{Orchestrator, OrchestratorOptions};
use squid_forecast::resolver::{FeatureFlags, ForecastSettings, resolve};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct ScriptedTransport {
    urls: Rc<RefCell<Vec<String>>>,
    body: Rc<RefCell<String>>,
    fail_next: Rc<RefCell<Option<ForecastError>>>,
}

impl ForecastTransport for ScriptedTransport {
    fn fetch(&self, url: &str) -> Result<ForecastResponse, ForecastError> {
        self.urls.borrow_mut().push(url.to_string());
        if let Some(err) = self.fail_next.borrow_mut().take() {
            return Err(err);
        }
        parse_forecast_response(&self.body.borrow())
    }
}

#[derive(Clone, Default)]
struct CapturingSink {
    values: Rc<RefCell<Vec<Vec<PathValue>>>>,
    meta: Rc<RefCell<Vec<Vec<PathValue>>>>,
}

impl MessageSink for CapturingSink {
    fn send_values(&mut self, values: Vec<PathValue>) -> Result<(), Box<dyn std::error::Error>> {
        self.values.borrow_mut().push(values);
        Ok(())
    }

    fn send_meta(&mut self, meta: Vec<PathValue>) -> Result<(), Box<dyn std::error::Error>> {
        self.meta.borrow_mut().push(meta);
        Ok(())
    }
}

struct Harness {
    orchestrator: Orchestrator,
    transport: ScriptedTransport,
    sink: CapturingSink,
    log: MemorySink,
}

fn harness(settings: ForecastSettings, body: Value) -> Harness {
    let log = MemorySink::new();
    let resolution = resolve(&settings, &log);
    let transport = ScriptedTransport::default();
    *transport.body.borrow_mut() = body.to_string();
    let sink = CapturingSink::default();
    let orchestrator = Orchestrator::new(
        resolution,
        OrchestratorOptions::default(),
        Box::new(transport.clone()),
        Box::new(sink.clone()),
        Box::new(log.clone()),
    );
    Harness {
        orchestrator,
        transport,
        sink,
        log,
    }
}

fn settings(flags: FeatureFlags, current: bool) -> ForecastSettings {
    ForecastSettings {
        api_key: "test-token".to_string(),
        flags,
        horizon: Some(48),
        offset: Some(1),
        current,
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
}

fn position(lat: f64, lon: f64) -> DeltaBatch {
    DeltaBatch::single(NAVIGATION_POSITION, json!({"latitude": lat, "longitude": lon}))
}

/// Two hourly slots with the default variable set, in API units.
fn default_body() -> Value {
    json!({
        "latitude": 43.0,
        "longitude": 5.0,
        "timezone": "Europe/Paris",
        "forecast": [
            {
                "timestamp": {"unix": 1_714_564_800},
                "windSpeed_10m": 10.0, "windDirection_10m": 90.0, "windGust": 14.0,
                "temperature_2m": 14.0, "relativeHumidity_2m": 70.0, "pressure": 1015.0
            },
            {
                "timestamp": {"unix": 1_714_568_400},
                "windSpeed_10m": 20.0, "windDirection_10m": 180.0, "windGust": null,
                "temperature_2m": 15.0, "relativeHumidity_2m": 65.0, "pressure": 1013.0
            }
        ],
        "metadata": {
            "windSpeed_10m": {"unit": "kn"},
            "windDirection_10m": {"unit": "deg"},
            "windGust": {"unit": "kn"},
            "temperature_2m": {"unit": "°C"},
            "relativeHumidity_2m": {"unit": "%"},
            "pressure": {"unit": "hPa"}
        },
        "errors": []
    })
}

fn value_at<'a>(values: &'a [PathValue], path: &str) -> Option<&'a Value> {
    values.iter().find(|v| v.path == path).map(|v| &v.value)
}

// ---------------------------------------------------------------------------
// Throttling
// ---------------------------------------------------------------------------

#[test]
fn test_one_request_per_refresh_window() {
    let mut h = harness(settings(FeatureFlags::default(), false), default_body());

    h.orchestrator.on_deltas_at(&position(43.0, 5.0), t0());
    h.orchestrator.on_deltas_at(&position(43.1, 5.1), t0() + Duration::minutes(10));
    h.orchestrator.on_tick_at(t0() + Duration::minutes(60));
    assert_eq!(
        h.transport.urls.borrow().len(),
        1,
        "triggers inside the refresh window must not issue requests"
    );

    h.orchestrator.on_tick_at(t0() + Duration::minutes(61));
    assert_eq!(h.transport.urls.borrow().len(), 2);
    assert_eq!(h.sink.values.borrow().len(), 2);
}

#[test]
fn test_failed_fetch_still_throttles_then_recovers() {
    let mut h = harness(settings(FeatureFlags::default(), false), default_body());
    *h.transport.fail_next.borrow_mut() = Some(ForecastError::Transport("connection refused".to_string()));

    h.orchestrator.on_deltas_at(&position(43.0, 5.0), t0());
    assert!(h.sink.values.borrow().is_empty());
    assert!(h.log.contains("connection refused"));
    assert!(h.orchestrator.is_alive(), "transport errors are not fatal");

    h.orchestrator.on_tick_at(t0() + Duration::minutes(30));
    assert_eq!(h.transport.urls.borrow().len(), 1);

    h.orchestrator.on_tick_at(t0() + Duration::minutes(90));
    assert_eq!(h.transport.urls.borrow().len(), 2);
    assert_eq!(h.sink.values.borrow().len(), 1);
}

#[test]
fn test_http_error_is_logged_as_error() {
    let mut h = harness(settings(FeatureFlags::default(), false), default_body());
    *h.transport.fail_next.borrow_mut() = Some(ForecastError::HttpError(503));

    h.orchestrator.on_deltas_at(&position(43.0, 5.0), t0());
    assert!(h.log.contains("HTTP error: 503"));
    assert!(h.log.count_at(LogLevel::Error) >= 1);
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

#[test]
fn test_emits_time_plus_every_active_output_in_canonical_units() {
    let mut h = harness(settings(FeatureFlags::default(), false), default_body());
    h.orchestrator.on_deltas_at(&position(43.0, 5.0), t0());

    let emitted = h.sink.values.borrow();
    assert_eq!(emitted.len(), 1);
    let values = &emitted[0];
    assert_eq!(values.len(), h.orchestrator.outputs().len() + 1);
    assert_eq!(values[0].path, "environment.forecast.time");
    assert_eq!(values[0].value, json!("2024-05-01T13:00:00.000Z"));

    let speed = value_at(values, "environment.forecast.wind.speed").and_then(Value::as_f64).unwrap();
    assert!((speed - 20.0 * 1852.0 / 3600.0).abs() < 1e-9);
    let direction = value_at(values, "environment.forecast.wind.direction").and_then(Value::as_f64).unwrap();
    assert!((direction - std::f64::consts::PI).abs() < 1e-9);
    let temperature = value_at(values, "environment.forecast.temperature").and_then(Value::as_f64).unwrap();
    assert!((temperature - 288.15).abs() < 1e-9);
    let humidity = value_at(values, "environment.forecast.relativeHumidity").and_then(Value::as_f64).unwrap();
    assert!((humidity - 0.65).abs() < 1e-9);
    let pressure = value_at(values, "environment.forecast.pressure").and_then(Value::as_f64).unwrap();
    assert!((pressure - 101_300.0).abs() < 1e-6);

    assert_eq!(value_at(values, "environment.forecast.wind.gust"), Some(&Value::Null));
}

#[test]
fn test_upstream_warnings_are_logged_and_processing_continues() {
    let mut body = default_body();
    body["errors"] = json!([{"message": "Variable sea not available at this position"}]);
    let mut h = harness(settings(FeatureFlags::default(), false), body);

    h.orchestrator.on_deltas_at(&position(43.0, 5.0), t0());
    assert!(h.log.contains("Variable sea not available at this position"));
    assert_eq!(h.sink.values.borrow().len(), 1);
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[test]
fn test_start_announces_metadata_once() {
    let mut h = harness(settings(FeatureFlags::default(), false), default_body());
    h.orchestrator.start();

    let meta = h.sink.meta.borrow();
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].len(), h.orchestrator.outputs().len());
    let speed = value_at(&meta[0], "environment.forecast.wind.speed").unwrap();
    assert_eq!(speed["units"], json!("m/s"));
    assert_eq!(speed["timeout"], json!(3600));
    assert!(h.log.contains("Interval started, refresh rate 60min"));
}

#[test]
fn test_first_load_requests_metadata_then_excludes_it() {
    let mut h = harness(settings(FeatureFlags::default(), false), default_body());

    h.orchestrator.on_deltas_at(&position(43.0, 5.0), t0());
    assert!(h.orchestrator.latest().metadata_loaded);

    // later responses carry no metadata; the cached units still apply
    let mut body = default_body();
    body.as_object_mut().unwrap().remove("metadata");
    *h.transport.body.borrow_mut() = body.to_string();
    h.orchestrator.on_tick_at(t0() + Duration::hours(2));

    let urls = h.transport.urls.borrow();
    assert!(urls[0].contains("&exclude=minute&"), "first request: {}", urls[0]);
    assert!(urls[1].contains("&exclude=minute,metadata&"), "second request: {}", urls[1]);

    let emitted = h.sink.values.borrow();
    assert_eq!(emitted.len(), 2);
    let temperature = value_at(&emitted[1], "environment.forecast.temperature").and_then(Value::as_f64);
    assert!(temperature.is_some_and(|k| (k - 288.15).abs() < 1e-9));
}

#[test]
fn test_apply_response_marks_only_first_load_initial() {
    let mut h = harness(settings(FeatureFlags::default(), false), default_body());

    let first = parse_forecast_response(&default_body().to_string()).unwrap();
    let summary = h.orchestrator.apply_response(first).expect("first load applies");
    assert!(summary.initial, "first response with metadata is the initial load");
    assert!(h.orchestrator.latest().metadata_loaded);

    let mut body = default_body();
    body.as_object_mut().unwrap().remove("metadata");
    let second = parse_forecast_response(&body.to_string()).unwrap();
    let summary = h.orchestrator.apply_response(second).expect("cached metadata applies");
    assert!(!summary.initial);

    let third = parse_forecast_response(&default_body().to_string()).unwrap();
    assert!(!h.orchestrator.apply_response(third).unwrap().initial, "metadata is only captured once");
}

#[test]
fn test_unavailable_sea_model_does_not_block_other_outputs() {
    let mut body = default_body();
    body["errors"] = json!([{"message": "sea not available at this position"}]);
    let mut h = harness(settings(FeatureFlags::default(), true), body);

    h.orchestrator.on_deltas_at(&position(43.0, 5.0), t0());
    h.orchestrator.on_tick_at(t0() + Duration::hours(2));

    assert!(h.log.contains("sea not available at this position"));
    let emitted = h.sink.values.borrow();
    assert_eq!(emitted.len(), 2, "every cycle still publishes");
    for values in emitted.iter() {
        assert_eq!(values.len(), h.orchestrator.outputs().len() + 1);
        for path in [
            "environment.forecast.water.temperature",
            "environment.forecast.current.speed",
            "environment.forecast.current.direction",
        ] {
            assert_eq!(value_at(values, path), Some(&Value::Null), "{} has no unit metadata", path);
        }
        let temperature = value_at(values, "environment.outside.temperature").and_then(Value::as_f64);
        assert!(temperature.is_some_and(|k| (k - 287.15).abs() < 1e-9));
    }

    for key in ["waterTemperature", "seaCurrentSpeed", "seaCurrentDirection"] {
        let needle = format!("No unit metadata for field '{}'", key);
        let count = h.log.records().iter().filter(|r| r.message.contains(&needle)).count();
        assert_eq!(count, 1, "{} is warned about once", key);
    }

    let urls = h.transport.urls.borrow();
    assert!(
        urls[1].contains("&exclude=minute&"),
        "metadata keeps being requested while sea units are unknown: {}",
        urls[1]
    );
}

// ---------------------------------------------------------------------------
// Configuration-driven behaviour
// ---------------------------------------------------------------------------

#[test]
fn test_empty_api_key_disables_everything() {
    let mut disabled = settings(FeatureFlags::default(), true);
    disabled.api_key = "   ".to_string();
    let mut h = harness(disabled, default_body());

    h.orchestrator.start();
    h.orchestrator.on_deltas_at(&position(43.0, 5.0), t0());
    h.orchestrator.on_tick_at(t0() + Duration::days(1));

    assert!(!h.orchestrator.is_enabled());
    assert!(h.transport.urls.borrow().is_empty());
    assert!(h.sink.meta.borrow().is_empty());
    assert!(h.sink.values.borrow().is_empty());
    assert!(h.log.contains("API-Key not provided - forecasts deactivated!"));
}

#[test]
fn test_current_readings_pull_in_sea_outputs() {
    let flags = FeatureFlags::none().with(FeatureGroup::Wind, true);
    let h = harness(settings(flags, true), default_body());

    let params = h.orchestrator.fetch_parameters().unwrap();
    assert!(params.variables.contains(&FeatureGroup::Sea));
    let paths: Vec<&str> = h.orchestrator.outputs().iter().map(|o| o.path()).collect();
    assert!(paths.contains(&"environment.forecast.water.temperature"));
    assert!(paths.contains(&"environment.forecast.current.speed"));
    assert!(paths.contains(&"environment.forecast.current.direction"));
    assert!(paths.contains(&"environment.outside.pressure"));
    assert!(!paths.contains(&"environment.forecast.waves.combinedHeight"));
}

#[test]
fn test_station_pressure_below_sea_level_after_waiting_elevation() {
    let flags = FeatureFlags::none()
        .with(FeatureGroup::Temperature, true)
        .with(FeatureGroup::Pressure, true)
        .with(FeatureGroup::Humidity, true);
    let mut body = default_body();
    body["metadata"]["waterTemperature"] = json!({"unit": "°C"});
    body["metadata"]["seaCurrentSpeed"] = json!({"unit": "kn"});
    body["metadata"]["seaCurrentDirection"] = json!({"unit": "deg"});
    let mut h = harness(settings(flags, true), body);

    let mut feed = DeltaBatch::single(NAVIGATION_ELEVATION, json!("waiting ..."));
    feed.updates.extend(position(43.0, 5.0).updates);
    h.orchestrator.on_deltas_at(&feed, t0());
    assert_eq!(h.orchestrator.latest().elevation_m, 0.0);

    let at_sea_level = {
        let values = &h.sink.values.borrow()[0];
        value_at(values, "environment.outside.pressure").and_then(Value::as_f64).unwrap()
    };
    assert!((at_sea_level - 101_500.0).abs() < 1e-6, "zero elevation leaves pressure unchanged");

    h.orchestrator.on_deltas_at(&DeltaBatch::single(NAVIGATION_ELEVATION, json!(120.0)), t0());
    h.orchestrator.on_tick_at(t0() + Duration::hours(2));
    let values = &h.sink.values.borrow()[1];
    let station = value_at(values, "environment.outside.pressure").and_then(Value::as_f64).unwrap();
    let forecast = value_at(values, "environment.forecast.pressure").and_then(Value::as_f64).unwrap();
    assert!(station < 101_500.0);
    assert!((forecast - 101_300.0).abs() < 1e-6, "forecast pressure is not corrected");
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_no_activity_after_stop() {
    let mut h = harness(settings(FeatureFlags::default(), false), default_body());
    h.orchestrator.stop();

    h.orchestrator.on_deltas_at(&position(43.0, 5.0), t0());
    h.orchestrator.on_tick_at(t0() + Duration::days(1));
    assert!(h.transport.urls.borrow().is_empty());
    assert!(h.sink.values.borrow().is_empty());
}

#[test]
fn test_unrelated_paths_are_ignored() {
    let mut h = harness(settings(FeatureFlags::default(), false), default_body());
    h.orchestrator.on_deltas_at(
        &DeltaBatch::single("navigation.speedOverGround", json!(3.2)),
        t0(),
    );
    assert!(h.transport.urls.borrow().is_empty());
    assert_eq!(h.orchestrator.latest().last_update, None);
}

//! Configuration/enablement resolution.
//!
//! Turns the user's feature flags and tuning values into the fixed request
//! variable list, the set of active outputs, and clamped horizon/offset
//! values. Resolution runs once per start; the result is owned by the
//! orchestrator for the rest of its life.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::delta::PathValue;
use crate::logging::{Component, LogSink};
use crate::measurements;
use crate::model::{FeatureGroup, FetchParameters, Horizon, MeasurementDefinition, Slot};

pub const DEFAULT_OFFSET: usize = 1;
pub const MAX_OFFSET: usize = 96;
/// Offsets above this are accepted but warned about.
pub const RECOMMENDED_MAX_OFFSET: i64 = 47;
pub const DEFAULT_HORIZON_HOURS: u32 = 8;
pub const MAX_HORIZON_HOURS: u32 = 24 * 7;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// User-selected feature flags, one per [`FeatureGroup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureFlags(BTreeMap<FeatureGroup, bool>);

impl FeatureFlags {
    /// All groups disabled.
    pub fn none() -> Self {
        Self(FeatureGroup::ALL.iter().map(|g| (*g, false)).collect())
    }

    pub fn with(mut self, group: FeatureGroup, enabled: bool) -> Self {
        self.set(group, enabled);
        self
    }

    pub fn set(&mut self, group: FeatureGroup, enabled: bool) {
        self.0.insert(group, enabled);
    }

    pub fn is_enabled(&self, group: FeatureGroup) -> bool {
        self.0.get(&group).copied().unwrap_or(false)
    }
}

/// Wind, temperature, pressure and humidity on; everything else off.
impl Default for FeatureFlags {
    fn default() -> Self {
        Self::none()
            .with(FeatureGroup::Wind, true)
            .with(FeatureGroup::Temperature, true)
            .with(FeatureGroup::Pressure, true)
            .with(FeatureGroup::Humidity, true)
    }
}

/// Raw values as configured, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSettings {
    pub api_key: String,
    pub flags: FeatureFlags,
    pub horizon: Option<i64>,
    pub offset: Option<i64>,
    pub current: bool,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Outcome of [`resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No API key: nothing is fetched and no metadata is announced.
    Disabled,
    Enabled(ResolvedConfig),
}

impl Resolution {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Resolution::Enabled(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub token: String,
    /// Requested API variables, deduplicated, in request order.
    pub variables: Vec<FeatureGroup>,
    pub horizon: Horizon,
    pub offset: usize,
    pub current: bool,
    /// Definitions that become active outputs, in emission order.
    pub outputs: Vec<&'static MeasurementDefinition>,
}

impl ResolvedConfig {
    pub fn fetch_parameters(&self) -> FetchParameters {
        FetchParameters {
            token: self.token.clone(),
            variables: self.variables.clone(),
            horizon: self.horizon,
            offset: self.offset,
            exclude_metadata: false,
        }
    }

    /// Metadata announcement: one entry per active output, with a staleness
    /// timeout equal to the refresh interval.
    pub fn meta_entries(&self, refresh: Duration) -> Vec<PathValue> {
        let timeout = refresh.as_secs();
        self.outputs
            .iter()
            .map(|def| {
                let mut meta = Map::new();
                if let Some(unit) = def.canonical_unit {
                    meta.insert("units".to_string(), json!(unit));
                }
                meta.insert("timeout".to_string(), json!(timeout));
                meta.insert("description".to_string(), json!(def.description));
                PathValue::new(def.output_path, Value::Object(meta))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Validates the offset. Out-of-range values are clamped, never rejected.
pub fn clamp_offset(raw: Option<i64>, log: &dyn LogSink) -> usize {
    let Some(raw) = raw else {
        return DEFAULT_OFFSET;
    };
    if raw > RECOMMENDED_MAX_OFFSET {
        log.warn(Component::Resolver, "Offset shall not exceed max. 48 hours!");
    }
    if raw <= 0 {
        DEFAULT_OFFSET
    } else {
        (raw as usize).min(MAX_OFFSET)
    }
}

/// Validates the horizon. The horizon always reaches past the raw offset.
pub fn clamp_horizon(raw: Option<i64>, offset_raw: Option<i64>, log: &dyn LogSink) -> Horizon {
    let Some(raw) = raw else {
        return Horizon::hours(DEFAULT_HORIZON_HOURS);
    };
    if raw > i64::from(MAX_HORIZON_HOURS) {
        log.warn(Component::Resolver, "Forecast only supports max. 7 days!");
    }
    if raw <= 0 {
        return Horizon::hours(DEFAULT_HORIZON_HOURS);
    }
    let offset = offset_raw.unwrap_or(DEFAULT_OFFSET as i64);
    let hours = offset
        .saturating_add(1)
        .max(raw)
        .min(i64::from(MAX_HORIZON_HOURS));
    Horizon::hours(hours as u32)
}

fn is_active(def: &MeasurementDefinition, flags: &FeatureFlags, current: bool) -> bool {
    match def.slot {
        Slot::Current => current,
        Slot::Forecast => flags.is_enabled(def.group) || (current && def.follows_current),
    }
}

/// Resolves configuration into the request variables and active outputs.
pub fn resolve(settings: &ForecastSettings, log: &dyn LogSink) -> Resolution {
    let token = settings.api_key.trim();
    if token.is_empty() {
        log.warn(Component::Resolver, "API-Key not provided - forecasts deactivated!");
        return Resolution::Disabled;
    }

    let offset = clamp_offset(settings.offset, log);
    let horizon = clamp_horizon(settings.horizon, settings.offset, log);

    let mut variables = Vec::new();
    let mut outputs = Vec::new();
    for def in measurements::all_definitions() {
        if !is_active(def, &settings.flags, settings.current) {
            continue;
        }
        if !variables.contains(&def.group) {
            variables.push(def.group);
        }
        outputs.push(def);
    }

    log.info(
        Component::Resolver,
        &format!(
            "Requesting [{}] with horizon {} at offset {}h, {} outputs",
            variables
                .iter()
                .map(|g| g.variable_name())
                .collect::<Vec<_>>()
                .join(","),
            horizon,
            offset,
            outputs.len()
        ),
    );

    Resolution::Enabled(ResolvedConfig {
        token: token.to_string(),
        variables,
        horizon,
        offset,
        current: settings.current,
        outputs,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

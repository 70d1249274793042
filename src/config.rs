//! Adapter configuration loaded from TOML.
//!
//! Every key is optional; a missing file section falls back to the defaults
//! below. The API key may also come from `SQUID_API_KEY` (directly or via a
//! `.env` file) when the file leaves it empty.
//!
//! ```toml
//! apikey = "..."
//! horizon = 48
//! offset = 1
//! current = false
//!
//! [variables]
//! wind = true
//! sea = true
//!
//! [service]
//! refresh_minutes = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::ingest::squid::FORECAST_API;
use crate::model::FeatureGroup;
use crate::resolver::{FeatureFlags, ForecastSettings};

pub const API_KEY_ENV: &str = "SQUID_API_KEY";

// ============================================================================
// TOML Configuration Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub apikey: String,
    pub variables: VariablesConfig,
    /// Forecast horizon in hours
    pub horizon: i64,
    /// Hours ahead of now to read the forecast at
    pub offset: i64,
    /// Also publish current readings (slot 0) under `environment.outside.*`
    pub current: bool,
    pub service: ServiceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apikey: String::new(),
            variables: VariablesConfig::default(),
            horizon: 48,
            offset: 1,
            current: false,
            service: ServiceConfig::default(),
        }
    }
}

/// One flag per API variable group
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VariablesConfig {
    pub wind: bool,
    pub temperature: bool,
    pub humidity: bool,
    pub pressure: bool,
    pub clouds: bool,
    pub storm: bool,
    pub precipitation: bool,
    pub snow: bool,
    pub sea: bool,
}

impl Default for VariablesConfig {
    fn default() -> Self {
        Self {
            wind: true,
            temperature: true,
            humidity: true,
            pressure: true,
            clouds: false,
            storm: false,
            precipitation: false,
            snow: false,
            sea: false,
        }
    }
}

impl VariablesConfig {
    pub fn to_flags(&self) -> FeatureFlags {
        FeatureFlags::none()
            .with(FeatureGroup::Wind, self.wind)
            .with(FeatureGroup::Temperature, self.temperature)
            .with(FeatureGroup::Humidity, self.humidity)
            .with(FeatureGroup::Pressure, self.pressure)
            .with(FeatureGroup::Clouds, self.clouds)
            .with(FeatureGroup::Storm, self.storm)
            .with(FeatureGroup::Precipitation, self.precipitation)
            .with(FeatureGroup::Snow, self.snow)
            .with(FeatureGroup::Sea, self.sea)
    }
}

/// Runtime settings of the adapter process itself
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub refresh_minutes: u64,
    pub request_timeout_secs: u64,
    pub log_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: FORECAST_API.to_string(),
            refresh_minutes: 60,
            request_timeout_secs: 30,
            log_file: None,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Fills an empty `apikey` from the environment, loading `.env` first.
    pub fn with_env_api_key(self) -> Self {
        dotenv::dotenv().ok();
        self.fill_api_key(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::with_env_api_key`] with an injectable lookup.
    pub fn fill_api_key<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.apikey.trim().is_empty() {
            if let Some(key) = lookup(API_KEY_ENV) {
                self.apikey = key;
            }
        }
        self
    }

    pub fn settings(&self) -> ForecastSettings {
        ForecastSettings {
            api_key: self.apikey.clone(),
            flags: self.variables.to_flags(),
            horizon: Some(self.horizon),
            offset: Some(self.offset),
            current: self.current,
        }
    }

    /// Refresh interval, never shorter than one minute.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.service.refresh_minutes.max(1) * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.service.request_timeout_secs.max(1))
    }
}

// ============================================================================
// Tests
// ============================================================================

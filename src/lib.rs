//! squid_forecast: SquidSailing marine forecast adapter.
//!
//! Polls the forecast API for the vessel's position and republishes the
//! selected hour as normalized path/value deltas.
//!
//! # Module structure
//!
//! ```text
//! squid_forecast
//! ├── model        — shared data types (FeatureGroup, OutputValue, LatestState, ForecastError, …)
//! ├── measurements — output path registry: API key, canonical unit, group
//! ├── units        — unit conversion and barometric station correction
//! ├── resolver     — feature flags → request variables + active outputs
//! ├── ingest
//! │   └── squid    — forecast API: URL construction, response types, transport
//! ├── orchestrator — throttled fetch cycle and output state
//! ├── summary      — nested per-cycle view for debug logging
//! ├── delta        — host message formats and subscriptions
//! ├── service      — single-threaded event loop
//! ├── config       — TOML configuration + API key from the environment
//! └── logging      — log sinks and failure classification
//! ```

pub mod config;
pub mod delta;
pub mod ingest;
pub mod logging;
pub mod measurements;
pub mod model;
pub mod orchestrator;
pub mod resolver;
pub mod service;
pub mod summary;
pub mod units;

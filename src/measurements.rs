//! Measurement registry for the SquidSailing forecast adapter.
//!
//! Defines every quantity the adapter knows how to publish, together with the
//! forecast API field it is read from and the unit it is published in. This is
//! the single source of truth for output paths; all other modules should
//! reference definitions from here rather than hardcoding paths or keys.

use crate::model::{FeatureGroup, MeasurementDefinition, Slot};

// ---------------------------------------------------------------------------
// Fixed paths
// ---------------------------------------------------------------------------

/// Path of the forecast slot timestamp, emitted on every successful cycle.
pub const FORECAST_TIME_PATH: &str = "environment.forecast.time";

const fn forecast(
    output_path: &'static str,
    source_key: &'static str,
    canonical_unit: Option<&'static str>,
    description: &'static str,
    group: FeatureGroup,
) -> MeasurementDefinition {
    MeasurementDefinition {
        output_path,
        source_key,
        canonical_unit,
        description,
        group,
        slot: Slot::Forecast,
        follows_current: false,
        beta: false,
        station_corrected: false,
    }
}

const fn current(
    output_path: &'static str,
    source_key: &'static str,
    canonical_unit: Option<&'static str>,
    description: &'static str,
    group: FeatureGroup,
) -> MeasurementDefinition {
    MeasurementDefinition {
        slot: Slot::Current,
        ..forecast(output_path, source_key, canonical_unit, description, group)
    }
}

const fn follows_current(def: MeasurementDefinition) -> MeasurementDefinition {
    MeasurementDefinition {
        follows_current: true,
        ..def
    }
}

const fn beta(def: MeasurementDefinition) -> MeasurementDefinition {
    MeasurementDefinition { beta: true, ..def }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// All measurements, grouped by feature group in API request order. Within a
/// group, forecast entries precede their current-reading counterparts.
pub static MEASUREMENTS: &[MeasurementDefinition] = &[
    forecast(
        "environment.forecast.wind.speed",
        "windSpeed_10m",
        Some("m/s"),
        "Wind speed at an elevation of 10 meters",
        FeatureGroup::Wind,
    ),
    forecast(
        "environment.forecast.wind.direction",
        "windDirection_10m",
        Some("rad"),
        "Wind direction at an elevation of 10 meters, angle counting clockwise from the North",
        FeatureGroup::Wind,
    ),
    forecast(
        "environment.forecast.wind.gust",
        "windGust",
        Some("m/s"),
        "Gust wind speed at ground level",
        FeatureGroup::Wind,
    ),
    follows_current(forecast(
        "environment.forecast.temperature",
        "temperature_2m",
        Some("K"),
        "Temperature at an elevation of 2 meters",
        FeatureGroup::Temperature,
    )),
    current(
        "environment.outside.temperature",
        "temperature_2m",
        Some("K"),
        "Current temperature at an elevation of 2 meters",
        FeatureGroup::Temperature,
    ),
    follows_current(forecast(
        "environment.forecast.relativeHumidity",
        "relativeHumidity_2m",
        Some("ratio"),
        "Relative humidity at an elevation of 2 meters",
        FeatureGroup::Humidity,
    )),
    current(
        "environment.outside.relativeHumidity",
        "relativeHumidity_2m",
        Some("ratio"),
        "Current relative humidity at an elevation of 2 meters",
        FeatureGroup::Humidity,
    ),
    follows_current(forecast(
        "environment.forecast.pressure",
        "pressure",
        Some("Pa"),
        "Pressure at mean sea level",
        FeatureGroup::Pressure,
    )),
    MeasurementDefinition {
        station_corrected: true,
        ..current(
            "environment.outside.pressure",
            "pressure",
            Some("Pa"),
            "Current pressure at station altitude",
            FeatureGroup::Pressure,
        )
    },
    forecast(
        "environment.forecast.clouds",
        "totalCloudCover",
        Some("ratio"),
        "Total cloud coverage",
        FeatureGroup::Clouds,
    ),
    forecast(
        "environment.forecast.storm.energy",
        "convectiveAvailablePotentialEnergy",
        None,
        "Convective available potential energy",
        FeatureGroup::Storm,
    ),
    forecast(
        "environment.forecast.storm.index",
        "liftedIndex",
        Some("K"),
        "Lifted index",
        FeatureGroup::Storm,
    ),
    beta(forecast(
        "environment.forecast.precipitation.rate",
        "precipitationRate",
        Some("mm/s"),
        "Precipitation rate",
        FeatureGroup::Precipitation,
    )),
    beta(forecast(
        "environment.forecast.precipitation.accumulated",
        "accumulatedPrecipitation",
        Some("mm"),
        "Accumulated precipitation",
        FeatureGroup::Precipitation,
    )),
    beta(forecast(
        "environment.forecast.snow",
        "snowCoverage",
        Some("mm"),
        "Snow coverage",
        FeatureGroup::Snow,
    )),
    follows_current(forecast(
        "environment.forecast.water.temperature",
        "waterTemperature",
        Some("K"),
        "Surface water temperature",
        FeatureGroup::Sea,
    )),
    forecast(
        "environment.forecast.waves.combinedHeight",
        "combinedWaveSignificantHeight",
        Some("m"),
        "Height of the combined wave",
        FeatureGroup::Sea,
    ),
    forecast(
        "environment.forecast.waves.primaryDirection",
        "primaryWaveDirection",
        Some("rad"),
        "Direction of the primary wave, angle counting clockwise from the North",
        FeatureGroup::Sea,
    ),
    forecast(
        "environment.forecast.waves.meanPeriod",
        "primaryWaveMeanPeriod",
        Some("s"),
        "Mean period of the primary wave",
        FeatureGroup::Sea,
    ),
    follows_current(forecast(
        "environment.forecast.current.speed",
        "seaCurrentSpeed",
        Some("m/s"),
        "Sea current speed",
        FeatureGroup::Sea,
    )),
    follows_current(forecast(
        "environment.forecast.current.direction",
        "seaCurrentDirection",
        Some("rad"),
        "Sea current direction, angle counting clockwise from the North",
        FeatureGroup::Sea,
    )),
];

/// Every definition, in registry order.
pub fn all_definitions() -> impl Iterator<Item = &'static MeasurementDefinition> {
    MEASUREMENTS.iter()
}

/// Definitions belonging to one feature group, in registry order.
pub fn definitions_in(group: FeatureGroup) -> impl Iterator<Item = &'static MeasurementDefinition> {
    MEASUREMENTS.iter().filter(move |d| d.group == group)
}

/// Looks up a definition by output path. Returns `None` if not found.
pub fn find_definition(output_path: &str) -> Option<&'static MeasurementDefinition> {
    MEASUREMENTS.iter().find(|d| d.output_path == output_path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Unit conversion into the canonical measurement system.
//!
//! The forecast API reports each field in a unit declared by its response
//! metadata, and that unit may differ between responses. Published values
//! always use one fixed unit per path (Kelvin, Pascal, radians, ratios, m/s,
//! meters, millimeters, seconds).

use std::f64::consts::PI;

use chrono::{DateTime, SecondsFormat};

/// Pseudo-unit for the forecast timestamp. Converts Unix seconds to ISO 8601.
pub const UNIX_DATE: &str = "unixdate";

/// Temperature assumed by the barometric correction when none is known.
pub const STANDARD_TEMPERATURE_K: f64 = 288.15;

const LAPSE_RATE_K_PER_M: f64 = 0.0065;
const BAROMETRIC_EXPONENT: f64 = 5.257;

/// Canonical units, in the order `convert` tries them as targets.
const CANONICAL_UNITS: [&str; 9] = ["K", "Pa", "rad", "ratio", "m/s", "m", "mm", "mm/s", "s"];

// ---------------------------------------------------------------------------
// Errors and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("no conversion from '{from}' to '{to}'")]
    Unsupported { from: String, to: String },
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),
    #[error("value {0} is not finite")]
    NonFinite(f64),
    #[error("invalid unix timestamp {0}")]
    InvalidTimestamp(i64),
}

/// Result of [`convert`]: a number in canonical units, or a formatted
/// timestamp for the `unixdate` pseudo-unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Converted {
    Number(f64),
    Timestamp(String),
}

// ---------------------------------------------------------------------------
// Conversion table
// ---------------------------------------------------------------------------

/// `target = value * scale + offset`
#[derive(Debug, Clone, Copy)]
struct Linear {
    scale: f64,
    offset: f64,
}

impl Linear {
    const fn scale(scale: f64) -> Self {
        Self { scale, offset: 0.0 }
    }

    fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

fn linear(from: &str, to: &str) -> Option<Linear> {
    let rule = match (from, to) {
        // temperature
        ("°C" | "C" | "degC" | "celsius", "K") => Linear {
            scale: 1.0,
            offset: 273.15,
        },
        ("°F" | "F" | "degF" | "fahrenheit", "K") => Linear {
            scale: 5.0 / 9.0,
            offset: 273.15 - 32.0 * 5.0 / 9.0,
        },
        // pressure
        ("hPa" | "mbar" | "mb", "Pa") => Linear::scale(100.0),
        ("kPa", "Pa") => Linear::scale(1_000.0),
        ("bar", "Pa") => Linear::scale(100_000.0),
        ("inHg", "Pa") => Linear::scale(3_386.389),
        ("mmHg", "Pa") => Linear::scale(133.322_387),
        ("atm", "Pa") => Linear::scale(101_325.0),
        // angle
        ("deg" | "°" | "degree" | "degrees", "rad") => Linear::scale(PI / 180.0),
        // ratio
        ("%" | "percent", "ratio") => Linear::scale(0.01),
        // speed
        ("km/h" | "kmh" | "kph", "m/s") => Linear::scale(1.0 / 3.6),
        ("kn" | "kt" | "kts" | "knots", "m/s") => Linear::scale(1_852.0 / 3_600.0),
        ("mph", "m/s") => Linear::scale(0.447_04),
        ("ft/s", "m/s") => Linear::scale(0.3048),
        // length
        ("km", "m") => Linear::scale(1_000.0),
        ("cm", "m") => Linear::scale(0.01),
        ("mm", "m") => Linear::scale(0.001),
        ("ft", "m") => Linear::scale(0.3048),
        ("in", "m") => Linear::scale(0.0254),
        ("m", "mm") => Linear::scale(1_000.0),
        ("cm", "mm") => Linear::scale(10.0),
        ("in", "mm") => Linear::scale(25.4),
        // precipitation rate
        ("mm/h", "mm/s") => Linear::scale(1.0 / 3_600.0),
        ("mm/min", "mm/s") => Linear::scale(1.0 / 60.0),
        ("kg/m2/s" | "kg m-2 s-1", "mm/s") => Linear::scale(1.0),
        // time
        ("min", "s") => Linear::scale(60.0),
        ("h", "s") => Linear::scale(3_600.0),
        ("ms", "s") => Linear::scale(0.001),
        _ => return None,
    };
    Some(rule)
}

/// Canonical unit a source unit converts to by default.
pub fn canonical_target(source_unit: &str) -> Option<&'static str> {
    if let Some(unit) = CANONICAL_UNITS.iter().find(|u| **u == source_unit) {
        return Some(*unit);
    }
    CANONICAL_UNITS
        .iter()
        .copied()
        .find(|target| linear(source_unit, target).is_some())
}

// ---------------------------------------------------------------------------
// Public conversions
// ---------------------------------------------------------------------------

/// Converts `value` from `source_unit` to its canonical unit.
///
/// `unixdate` is special-cased and yields an ISO 8601 timestamp string.
pub fn convert(source_unit: &str, value: f64) -> Result<Converted, ConversionError> {
    if source_unit == UNIX_DATE {
        if !value.is_finite() {
            return Err(ConversionError::NonFinite(value));
        }
        return unix_to_iso(value as i64).map(Converted::Timestamp);
    }
    let target = canonical_target(source_unit)
        .ok_or_else(|| ConversionError::UnknownUnit(source_unit.to_string()))?;
    convert_to(source_unit, target, value).map(Converted::Number)
}

/// Converts `value` from `source_unit` into exactly `target_unit`.
///
/// Identity when both units are equal, whatever the value.
pub fn convert_to(source_unit: &str, target_unit: &str, value: f64) -> Result<f64, ConversionError> {
    if source_unit == target_unit {
        return Ok(value);
    }
    if !value.is_finite() {
        return Err(ConversionError::NonFinite(value));
    }
    linear(source_unit, target_unit)
        .map(|rule| rule.apply(value))
        .ok_or_else(|| ConversionError::Unsupported {
            from: source_unit.to_string(),
            to: target_unit.to_string(),
        })
}

/// Formats Unix seconds as an ISO 8601 UTC timestamp, e.g.
/// `2024-05-01T13:00:00.000Z`.
pub fn unix_to_iso(seconds: i64) -> Result<String, ConversionError> {
    DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or(ConversionError::InvalidTimestamp(seconds))
}

/// Reduces a sea-level pressure to the pressure at station altitude.
///
/// Uses the barometric formula with a standard lapse rate:
///   p = p0 * (1 - L*h / (T + L*h)) ^ 5.257
/// where `T` is the station temperature in Kelvin. A missing or non-physical
/// temperature falls back to [`STANDARD_TEMPERATURE_K`].
pub fn to_station_altitude(
    sea_level_pressure_pa: f64,
    station_elevation_m: f64,
    temperature_k: Option<f64>,
) -> f64 {
    let temperature = temperature_k
        .filter(|t| t.is_finite() && *t > 0.0)
        .unwrap_or(STANDARD_TEMPERATURE_K);
    let lapse = LAPSE_RATE_K_PER_M * station_elevation_m;
    sea_level_pressure_pa * (1.0 - lapse / (temperature + lapse)).powf(BAROMETRIC_EXPONENT)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_same_unit_is_identity() {
        for unit in ["K", "Pa", "rad", "ratio", "m/s", "mm", "furlong", ""] {
            assert_eq!(convert_to(unit, unit, 12.345).unwrap(), 12.345);
        }
        assert!(convert_to("K", "K", f64::NAN).unwrap().is_nan());
    }

    #[test]
    fn test_temperature_to_kelvin() {
        assert!(close(convert_to("°C", "K", 15.0).unwrap(), 288.15));
        assert!(close(convert_to("degF", "K", 32.0).unwrap(), 273.15));
        assert!(close(convert_to("F", "K", 212.0).unwrap(), 373.15));
    }

    #[test]
    fn test_pressure_to_pascal() {
        assert!(close(convert_to("hPa", "Pa", 1013.25).unwrap(), 101_325.0));
        assert!(close(convert_to("kPa", "Pa", 101.325).unwrap(), 101_325.0));
    }

    #[test]
    fn test_degrees_to_radians() {
        assert!(close(convert_to("deg", "rad", 180.0).unwrap(), PI));
        assert!(close(convert_to("°", "rad", 90.0).unwrap(), PI / 2.0));
    }

    #[test]
    fn test_speed_and_ratio() {
        assert!(close(convert_to("kn", "m/s", 1.0).unwrap(), 0.514_444_444_444_444_4));
        assert!(close(convert_to("km/h", "m/s", 36.0).unwrap(), 10.0));
        assert!(close(convert_to("%", "ratio", 85.0).unwrap(), 0.85));
    }

    #[test]
    fn test_precipitation_and_length() {
        assert!(close(convert_to("mm/h", "mm/s", 3_600.0).unwrap(), 1.0));
        assert!(close(convert_to("m", "mm", 0.25).unwrap(), 250.0));
        assert!(close(convert_to("cm", "m", 150.0).unwrap(), 1.5));
    }

    #[test]
    fn test_unsupported_pair_fails() {
        let err = convert_to("hPa", "K", 1000.0).unwrap_err();
        assert_eq!(
            err,
            ConversionError::Unsupported {
                from: "hPa".to_string(),
                to: "K".to_string()
            }
        );
    }

    #[test]
    fn test_non_finite_value_fails_for_real_conversions() {
        assert_eq!(
            convert_to("hPa", "Pa", f64::INFINITY).unwrap_err(),
            ConversionError::NonFinite(f64::INFINITY)
        );
    }

    #[test]
    fn test_convert_picks_canonical_target() {
        assert_eq!(convert("hPa", 10.0).unwrap(), Converted::Number(1_000.0));
        assert_eq!(convert("Pa", 10.0).unwrap(), Converted::Number(10.0));
        assert_eq!(canonical_target("cm"), Some("m"));
        assert_eq!(canonical_target("%"), Some("ratio"));
        assert_eq!(
            convert("parsec", 1.0).unwrap_err(),
            ConversionError::UnknownUnit("parsec".to_string())
        );
    }

    #[test]
    fn test_unixdate_yields_iso_timestamp() {
        // 2024-05-01 13:00:00 UTC
        assert_eq!(
            convert(UNIX_DATE, 1_714_568_400.0).unwrap(),
            Converted::Timestamp("2024-05-01T13:00:00.000Z".to_string())
        );
        assert_eq!(unix_to_iso(0).unwrap(), "1970-01-01T00:00:00.000Z");
        assert!(unix_to_iso(i64::MAX).is_err());
    }

    #[test]
    fn test_station_pressure_decreases_with_altitude() {
        let at_50m = to_station_altitude(101_325.0, 50.0, Some(288.0));
        assert!(at_50m < 101_325.0);
        let at_500m = to_station_altitude(101_325.0, 500.0, Some(288.0));
        assert!(at_500m < at_50m);
        // roughly 12 Pa per meter near sea level
        assert!((101_325.0 - at_50m - 600.0).abs() < 60.0, "got {}", at_50m);
    }

    #[test]
    fn test_station_pressure_at_sea_level_is_unchanged() {
        assert!(close(to_station_altitude(100_000.0, 0.0, None), 100_000.0));
    }

    #[test]
    fn test_station_pressure_falls_back_to_standard_temperature() {
        let fallback = to_station_altitude(101_325.0, 120.0, None);
        let standard = to_station_altitude(101_325.0, 120.0, Some(STANDARD_TEMPERATURE_K));
        let nonsense = to_station_altitude(101_325.0, 120.0, Some(-5.0));
        assert!(close(fallback, standard));
        assert!(close(nonsense, standard));
    }
}

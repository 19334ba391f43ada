//! Device-native ↔ engineering unit conversion.
//!
//! The controller reports offsets as integers in thousandths of a millimeter.
//! Conversion is a fixed linear scale applied before any comparison or
//! persistence.

/// Device units per millimeter.
pub const UNITS_PER_MM: f64 = 1000.0;

/// Convert a raw register value to millimeters.
pub fn raw_to_mm(raw: i32) -> f64 {
    f64::from(raw) / UNITS_PER_MM
}

/// Convert millimeters back to the nearest raw register value.
pub fn mm_to_raw(mm: f64) -> i64 {
    (mm * UNITS_PER_MM).round() as i64
}

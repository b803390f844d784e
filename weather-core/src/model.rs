use serde::{Deserialize, Serialize};

/// Canonical current-weather value every provider must produce.
///
/// Wind speed is in km/h and temperature in whole degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Weather {
    pub wind_speed: i64,
    pub temperature_degrees: i64,
}

impl Weather {
    pub const fn new(wind_speed: i64, temperature_degrees: i64) -> Self {
        Self { wind_speed, temperature_degrees }
    }
}

/// Rounds half away from zero. Returns `None` for NaN, infinities and values
/// that do not fit in an `i64`.
pub fn round_to_int(value: f64) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let rounded = value.round();
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
        return None;
    }
    Some(rounded as i64)
}

pub fn mps_to_kmh(mps: f64) -> f64 {
    mps * 3.6
}

//! Barometric altitude from the International Standard Atmosphere, troposphere only.

use crate::error::{InstrumentError, Result};

/// Zero-altitude reference pressure (hPa)
pub const SEA_LEVEL_PRESSURE_HPA: f64 = 1013.25;

const PRESSURE_EXPONENT: f64 = 0.190284;
const ALTITUDE_SCALE_M: f64 = 44307.69;

/// Altitude in meters above the 1013.25 hPa reference.
///
/// Non-positive or non-finite pressure is rejected rather than producing NaN.
pub fn estimate_altitude(pressure_hpa: f64) -> Result<f64> {
    if !pressure_hpa.is_finite() || pressure_hpa <= 0.0 {
        return Err(InstrumentError::InvalidInput(format!(
            "pressure must be a positive number of hPa, got {}",
            pressure_hpa
        )));
    }

    Ok((1.0 - (pressure_hpa / SEA_LEVEL_PRESSURE_HPA).powf(PRESSURE_EXPONENT)) * ALTITUDE_SCALE_M)
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::storage::LOGS_KEY;
use crate::units::UnitPreference;

/// Barometer delivery interval
pub const PRESSURE_INTERVAL: Duration = Duration::from_millis(500);

/// Accelerometer delivery interval
pub const ACCELERATION_INTERVAL: Duration = Duration::from_millis(100);

/// Attitude indicator transition time
pub const ATTITUDE_EASE: Duration = Duration::from_millis(100);

/// Per-session settings. Sensor intervals are fixed constants and not part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Display units at session start
    pub units: UnitPreference,
    /// Attitude smoothing duration in milliseconds (0 disables easing)
    pub smoothing_ms: u64,
    /// Key the flight log lives under
    pub log_key: String,
}

impl SessionConfig {
    pub fn smoothing(&self) -> Duration {
        Duration::from_millis(self.smoothing_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            units: UnitPreference::default(),
            smoothing_ms: ATTITUDE_EASE.as_millis() as u64,
            log_key: LOGS_KEY.to_string(),
        }
    }
}

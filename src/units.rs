use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InstrumentError;

/// Feet per meter
pub const FEET_PER_METER: f64 = 3.28084;

/// Unit for vertical speed display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VelocityUnit {
    #[default]
    #[serde(rename = "m/s")]
    MetersPerSecond,
    #[serde(rename = "ft/s")]
    FeetPerSecond,
}

/// Unit for altitude display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AltitudeUnit {
    #[default]
    #[serde(rename = "m")]
    Meters,
    #[serde(rename = "ft")]
    Feet,
}

impl VelocityUnit {
    pub fn label(&self) -> &'static str {
        match self {
            VelocityUnit::MetersPerSecond => "m/s",
            VelocityUnit::FeetPerSecond => "ft/s",
        }
    }

    /// The other unit, as flipped by the settings toggle
    pub fn toggled(&self) -> Self {
        match self {
            VelocityUnit::MetersPerSecond => VelocityUnit::FeetPerSecond,
            VelocityUnit::FeetPerSecond => VelocityUnit::MetersPerSecond,
        }
    }
}

impl AltitudeUnit {
    pub fn label(&self) -> &'static str {
        match self {
            AltitudeUnit::Meters => "m",
            AltitudeUnit::Feet => "ft",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            AltitudeUnit::Meters => AltitudeUnit::Feet,
            AltitudeUnit::Feet => AltitudeUnit::Meters,
        }
    }
}

impl fmt::Display for VelocityUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for AltitudeUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for VelocityUnit {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "m/s" | "mps" => Ok(VelocityUnit::MetersPerSecond),
            "ft/s" | "fps" => Ok(VelocityUnit::FeetPerSecond),
            other => Err(InstrumentError::InvalidInput(format!(
                "unknown velocity unit '{}'",
                other
            ))),
        }
    }
}

impl FromStr for AltitudeUnit {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "m" => Ok(AltitudeUnit::Meters),
            "ft" => Ok(AltitudeUnit::Feet),
            other => Err(InstrumentError::InvalidInput(format!(
                "unknown altitude unit '{}'",
                other
            ))),
        }
    }
}

/// Display unit selection, owned by the sampling session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitPreference {
    pub velocity: VelocityUnit,
    pub altitude: AltitudeUnit,
}

/// A single change issued by the display layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitChange {
    Velocity(VelocityUnit),
    Altitude(AltitudeUnit),
}

impl UnitPreference {
    pub fn new(velocity: VelocityUnit, altitude: AltitudeUnit) -> Self {
        Self { velocity, altitude }
    }

    pub fn apply(&mut self, change: UnitChange) {
        match change {
            UnitChange::Velocity(unit) => self.velocity = unit,
            UnitChange::Altitude(unit) => self.altitude = unit,
        }
    }
}

pub fn convert_velocity(value_mps: f64, target: VelocityUnit) -> f64 {
    match target {
        VelocityUnit::MetersPerSecond => value_mps,
        VelocityUnit::FeetPerSecond => value_mps * FEET_PER_METER,
    }
}

pub fn convert_altitude(value_m: f64, target: AltitudeUnit) -> f64 {
    match target {
        AltitudeUnit::Meters => value_m,
        AltitudeUnit::Feet => value_m * FEET_PER_METER,
    }
}

/// Convert and tag a vertical speed, e.g. `"1.25 m/s"`
pub fn format_velocity(value_mps: f64, target: VelocityUnit) -> String {
    format!("{:.2} {}", convert_velocity(value_mps, target), target)
}

/// Convert and tag an altitude, e.g. `"328.08 ft"`
pub fn format_altitude(value_m: f64, target: AltitudeUnit) -> String {
    format!("{:.2} {}", convert_altitude(value_m, target), target)
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::altitude::estimate_altitude;
use crate::error::Result;

/// Climb/sink indicator shown next to the vario needle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarioDirection {
    Climbing,
    Sinking,
    /// No rate yet
    Neutral,
}

impl VarioDirection {
    pub fn from_rate(rate_mps: Option<f64>) -> Self {
        match rate_mps {
            Some(rate) if rate > 0.0 => VarioDirection::Climbing,
            Some(_) => VarioDirection::Sinking,
            None => VarioDirection::Neutral,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            VarioDirection::Climbing => "↑",
            VarioDirection::Sinking => "↓",
            VarioDirection::Neutral => "-",
        }
    }
}

/// Finite-difference vertical speed from successive barometric altitudes.
///
/// Holds only the previous altitude and its timestamp. Samples must arrive in
/// order on a single task; no internal locking.
#[derive(Debug, Clone, Default)]
pub struct VerticalRateDifferentiator {
    last: Option<(f64, DateTime<Utc>)>,
}

impl VerticalRateDifferentiator {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Feed a pressure reading taken at `now`.
    ///
    /// Returns `Ok(None)` for the first sample and whenever the elapsed time is
    /// not positive. In the latter case the stored sample is kept, so the next
    /// well-ordered sample differentiates against it.
    pub fn update(&mut self, pressure_hpa: f64, now: DateTime<Utc>) -> Result<Option<f64>> {
        Ok(self.update_with_altitude(pressure_hpa, now)?.1)
    }

    /// Same as [`update`](Self::update), also returning the altitude of this sample
    pub fn update_with_altitude(
        &mut self,
        pressure_hpa: f64,
        now: DateTime<Utc>,
    ) -> Result<(f64, Option<f64>)> {
        let altitude = estimate_altitude(pressure_hpa)?;

        let (last_altitude, last_time) = match self.last {
            Some(last) => last,
            None => {
                self.last = Some((altitude, now));
                return Ok((altitude, None));
            }
        };

        let dt = elapsed_secs(last_time, now);
        if dt <= 0.0 {
            log::debug!("Skipping vario update, non-positive interval {:.6}s", dt);
            return Ok((altitude, None));
        }

        self.last = Some((altitude, now));
        Ok((altitude, Some((altitude - last_altitude) / dt)))
    }

    pub fn last_altitude(&self) -> Option<f64> {
        self.last.map(|(altitude, _)| altitude)
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Seconds between two instants at nanosecond resolution
fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to.signed_duration_since(from);
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        // Over ~292 years apart
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

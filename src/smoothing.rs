use std::time::{Duration, Instant};

use crate::attitude::AttitudeEstimate;

/// Eases the displayed attitude towards the latest estimate over a fixed duration.
///
/// Each new target restarts the transition from wherever the display currently is,
/// so a burst of samples never makes the horizon jump.
pub struct AttitudeEaser {
    duration: Duration,
    from: AttitudeEstimate,
    to: AttitudeEstimate,
    started: Option<Instant>,
}

impl AttitudeEaser {
    /// Create an easer with the given transition time (typically 100ms)
    pub fn new(duration: Duration) -> Self {
        AttitudeEaser {
            duration,
            from: AttitudeEstimate::level(),
            to: AttitudeEstimate::level(),
            started: None,
        }
    }

    /// Start moving towards `target` at `now`
    pub fn retarget(&mut self, target: AttitudeEstimate, now: Instant) {
        self.from = self.sample(now);
        self.to = target;
        self.started = Some(now);
    }

    /// Attitude to present at `now`
    pub fn sample(&self, now: Instant) -> AttitudeEstimate {
        let started = match self.started {
            Some(t) => t,
            None => return self.to,
        };

        let progress = if self.duration.is_zero() {
            1.0
        } else {
            let elapsed = now.saturating_duration_since(started);
            (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
        };
        let w = ease_in_out(progress);

        AttitudeEstimate {
            pitch_deg: self.from.pitch_deg + (self.to.pitch_deg - self.from.pitch_deg) * w,
            roll_deg: self.from.roll_deg + (self.to.roll_deg - self.from.roll_deg) * w,
        }
    }
}

/// Cosine ease: 0 -> 0, 1 -> 1, zero slope at both ends
fn ease_in_out(t: f64) -> f64 {
    0.5 - 0.5 * (std::f64::consts::PI * t.clamp(0.0, 1.0)).cos()
}

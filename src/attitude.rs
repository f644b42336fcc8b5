use serde::{Deserialize, Serialize};

/// Pitch and roll in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AttitudeEstimate {
    pub pitch_deg: f64,
    pub roll_deg: f64,
}

impl AttitudeEstimate {
    pub fn level() -> Self {
        Self::default()
    }
}

/// Instantaneous attitude from the gravity vector (any consistent unit, usually g).
///
/// The all-zero vector and non-finite components yield level attitude instead of
/// whatever `atan2(0, 0)` or NaN propagation would give.
pub fn estimate_attitude(x: f64, y: f64, z: f64) -> AttitudeEstimate {
    if !(x.is_finite() && y.is_finite() && z.is_finite()) {
        return AttitudeEstimate::level();
    }
    if x == 0.0 && y == 0.0 && z == 0.0 {
        return AttitudeEstimate::level();
    }

    let pitch_deg = y.atan2(z).to_degrees();
    let roll_deg = x.atan2((y * y + z * z).sqrt()).to_degrees();

    AttitudeEstimate { pitch_deg, roll_deg }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_level_vector() {
        assert_eq!(estimate_attitude(0.0, 0.0, 1.0), AttitudeEstimate::level());
    }

    #[test]
    fn test_full_roll() {
        let att = estimate_attitude(1.0, 0.0, 0.0);
        assert_abs_diff_eq!(att.roll_deg, 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(att.pitch_deg, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pitch_45() {
        let att = estimate_attitude(0.0, 1.0, 1.0);
        assert_abs_diff_eq!(att.pitch_deg, 45.0, epsilon = 1e-9);
        assert_abs_diff_eq!(att.roll_deg, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_inverted_device() {
        let att = estimate_attitude(0.0, 0.0, -1.0);
        assert_abs_diff_eq!(att.pitch_deg.abs(), 180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_inputs_are_level() {
        assert_eq!(estimate_attitude(0.0, 0.0, 0.0), AttitudeEstimate::level());
        assert_eq!(estimate_attitude(f64::NAN, 0.0, 1.0), AttitudeEstimate::level());
        assert_eq!(estimate_attitude(0.0, f64::INFINITY, 1.0), AttitudeEstimate::level());
    }
}

//! Complementary Sensor Fusion
//!
//! ## Overview
//!
//! Merges the two position/attitude sources the vehicle carries into one
//! consistent estimate:
//!
//! - **IMU** (high rate, drift-prone): acceleration and angular rate,
//!   integrated into position, velocity, and attitude
//! - **GPS** (low rate, noisy but drift-free): absolute position fixes
//!
//! ```text
//! IMU  ──integrate──┐
//!                   ├─→ α·inertial + (1-α)·absolute ─→ FusedState
//! GPS  ──fix────────┘
//! ```
//!
//! A complementary filter is deliberately chosen over a Kalman filter:
//! fixed weights, no covariance bookkeeping, constant-time update. For a
//! recovery decision that only needs a smoothed trend, the simpler filter
//! is easier to verify and cannot diverge numerically.
//!
//! ## Determinism
//!
//! `dt` is caller-supplied and the filter performs no internal timing.
//! `update()` is a pure function of the previous state and the new
//! samples, so identical inputs always produce identical outputs — the
//! property the unit tests pin down.
//!
//! ## Degenerate Input
//!
//! A zero-magnitude acceleration vector has no gravity direction, so the
//! accelerometer tilt is undefined. The filter then skips the tilt
//! correction and keeps the gyro-propagated attitude instead of letting
//! atan2/division produce NaN.

use libm::{atan2, sqrt};

use crate::errors::ConfigError;

/// Degrees per radian, for the accelerometer tilt conversion
const RAD_TO_DEG: f64 = 180.0 / core::f64::consts::PI;

/// Acceleration magnitudes below this have no usable gravity direction
const ACCEL_NORM_EPSILON: f64 = 1e-9;

/// Three-component vector (x, y, z) or (roll, pitch, yaw)
pub type Vec3 = [f64; 3];

/// Fixed blend weights for the complementary filter
///
/// Weights close to 1 trust the inertial propagation; the remainder pulls
/// the estimate toward the absolute reference. Tunable constants, not
/// derived quantities.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterConfig {
    /// Weight of dead-reckoned position/velocity vs the GPS fix
    pub alpha_pos: f64,
    /// Weight of gyro-integrated attitude vs accelerometer tilt
    pub alpha_att: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            alpha_pos: 0.98,
            alpha_att: 0.98,
        }
    }
}

impl FilterConfig {
    /// Validate that both weights are inside [0, 1]
    pub fn validate(&self) -> Result<(), ConfigError> {
        for value in [self.alpha_pos, self.alpha_att] {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(ConfigError::FilterWeight { value });
            }
        }
        Ok(())
    }
}

/// The fused vehicle estimate
///
/// Mutated only by [`ComplementaryFilter::update`]; single-writer by
/// construction since the filter lives inside the orchestrator task.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FusedState {
    /// Position estimate, blend of dead reckoning and GPS
    pub position: Vec3,
    /// Velocity estimate, m/s
    pub velocity: Vec3,
    /// Attitude (roll, pitch, yaw), degrees
    pub attitude: Vec3,
}

/// Complementary filter over GPS and IMU streams
#[derive(Debug, Clone)]
pub struct ComplementaryFilter {
    config: FilterConfig,
    state: FusedState,
    previous_gps: Option<Vec3>,
}

impl ComplementaryFilter {
    /// Create a filter at the origin with validated weights
    pub fn new(config: FilterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: FusedState::default(),
            previous_gps: None,
        })
    }

    /// Current fused estimate
    pub const fn state(&self) -> &FusedState {
        &self.state
    }

    /// Fold one sample set into the estimate
    ///
    /// - `gps_position`: absolute fix (same frame as the position estimate)
    /// - `accel`: m/s², body frame
    /// - `gyro`: angular rate, degrees/s
    /// - `dt`: seconds since the previous update (nominal 0.01–0.02)
    ///
    /// A non-positive or non-finite `dt` leaves the state untouched.
    pub fn update(&mut self, gps_position: Vec3, accel: Vec3, gyro: Vec3, dt: f64) -> FusedState {
        if !(dt > 0.0) || !dt.is_finite() {
            return self.state;
        }

        let a_pos = self.config.alpha_pos;
        let a_att = self.config.alpha_att;

        // Position: dead reckoning blended against the raw fix.
        let mut position = [0.0; 3];
        for i in 0..3 {
            let dead_reckoned =
                self.state.position[i] + self.state.velocity[i] * dt + 0.5 * accel[i] * dt * dt;
            position[i] = a_pos * dead_reckoned + (1.0 - a_pos) * gps_position[i];
        }

        // Velocity: inertial integration blended against the
        // finite-difference GPS velocity. Before the second fix exists
        // there is no GPS velocity, so inertial stands alone.
        let mut velocity = [0.0; 3];
        for i in 0..3 {
            let inertial = self.state.velocity[i] + accel[i] * dt;
            velocity[i] = match self.previous_gps {
                Some(prev) => {
                    let gps_velocity = (gps_position[i] - prev[i]) / dt;
                    a_pos * inertial + (1.0 - a_pos) * gps_velocity
                }
                None => inertial,
            };
        }

        // Attitude: gyro integration, corrected by accelerometer tilt
        // when the gravity direction is observable.
        let mut attitude = [
            self.state.attitude[0] + gyro[0] * dt,
            self.state.attitude[1] + gyro[1] * dt,
            self.state.attitude[2] + gyro[2] * dt,
        ];

        let norm = sqrt(accel[0] * accel[0] + accel[1] * accel[1] + accel[2] * accel[2]);
        if norm > ACCEL_NORM_EPSILON {
            let ax = accel[0] / norm;
            let ay = accel[1] / norm;
            let az = accel[2] / norm;

            let roll_accel = atan2(ay, az) * RAD_TO_DEG;
            let pitch_accel = atan2(-ax, sqrt(ay * ay + az * az)) * RAD_TO_DEG;

            attitude[0] = a_att * attitude[0] + (1.0 - a_att) * roll_accel;
            attitude[1] = a_att * attitude[1] + (1.0 - a_att) * pitch_accel;
            // Yaw has no gravity reference; gyro integration stands.
        }

        self.state = FusedState {
            position,
            velocity,
            attitude,
        };
        self.previous_gps = Some(gps_position);
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAVITY: Vec3 = [0.0, 0.0, 9.81];

    fn filter() -> ComplementaryFilter {
        ComplementaryFilter::new(FilterConfig::default()).unwrap()
    }

    #[test]
    fn rejects_invalid_weights() {
        let config = FilterConfig {
            alpha_pos: 1.5,
            alpha_att: 0.98,
        };
        assert!(ComplementaryFilter::new(config).is_err());
    }

    #[test]
    fn update_is_deterministic() {
        let mut a = filter();
        let mut b = a.clone();

        let gps = [37.5, 127.0, 150.0];
        let gyro = [1.0, -0.5, 0.2];

        let out_a = a.update(gps, GRAVITY, gyro, 0.02);
        let out_b = b.update(gps, GRAVITY, gyro, 0.02);
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn zero_accel_holds_tilt_correction() {
        let mut f = filter();
        let out = f.update([0.0; 3], [0.0; 3], [10.0, 20.0, 30.0], 0.1);

        // Gyro integration still applies; nothing may become NaN.
        assert!((out.attitude[0] - 1.0).abs() < 1e-9);
        assert!((out.attitude[1] - 2.0).abs() < 1e-9);
        assert!((out.attitude[2] - 3.0).abs() < 1e-9);
        assert!(out.attitude.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn level_accel_pulls_attitude_toward_zero_tilt() {
        let mut f = filter();
        // Start with an integrated roll error and no rotation rate.
        f.state.attitude = [10.0, 0.0, 0.0];

        for _ in 0..500 {
            f.update([0.0; 3], GRAVITY, [0.0; 3], 0.02);
        }
        // Tilt from a level gravity vector is zero; the blend should have
        // bled off most of the roll error.
        assert!(f.state.attitude[0].abs() < 1.0);
    }

    #[test]
    fn gps_bounds_position_drift() {
        let mut f = filter();
        let fix = [100.0, 200.0, 300.0];

        for _ in 0..2000 {
            f.update(fix, [0.0, 0.0, 0.0], [0.0; 3], 0.02);
        }
        // With zero acceleration the estimate converges onto the fix.
        for i in 0..3 {
            assert!((f.state.position[i] - fix[i]).abs() < 1.0);
        }
    }

    #[test]
    fn non_positive_dt_is_a_no_op() {
        let mut f = filter();
        let before = *f.state();
        f.update([1.0; 3], GRAVITY, [1.0; 3], 0.0);
        f.update([1.0; 3], GRAVITY, [1.0; 3], -0.5);
        assert_eq!(before, *f.state());
    }
}

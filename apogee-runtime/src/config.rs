//! Runtime Configuration
//!
//! One immutable configuration value, constructed at startup and handed
//! into each component constructor. There is no ambient global config:
//! every cadence and bound a task uses arrives through its constructor,
//! which keeps tests free to compress time.

use std::time::Duration;

use apogee_core::calib::DEFAULT_CALIBRATION_SAMPLES;

/// Exponential backoff bounds for sensor initialization
///
/// Mirrors the recovery contract: initial wait doubling up to the cap,
/// at most `max_attempts` tries per cycle. The outer supervisor loop
/// retries indefinitely across cycles — a recoverable sensor should
/// reconnect without operator intervention.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// First wait after a failed initialization
    pub initial: Duration,
    /// Upper bound on any single wait
    pub cap: Duration,
    /// Attempts per initialization cycle before giving up for this cycle
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(4),
            cap: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl BackoffConfig {
    /// Wait before attempt `attempt` (0-based): `initial · 2^attempt`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let doubled = self
            .initial
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        doubled.min(self.cap)
    }
}

/// Cadences and bounds for the runtime tasks
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Sensor poll cadence in the `Ready` state (and calibration sub-cadence)
    pub poll_period: Duration,
    /// Orchestrator aggregation cycle period
    pub loop_period: Duration,
    /// Raw samples averaged into each sensor's calibration baseline
    pub calibration_samples: u32,
    /// Oldest a channel's latest sample may be and still feed a decision
    ///
    /// Resolves the latest-value-wins staleness ambiguity explicitly: a
    /// slot older than this skips decision evaluation for the cycle with
    /// a warning rather than silently trusting stale data.
    pub max_sample_age: Duration,
    /// Per-sensor and persistence queue capacity
    pub channel_capacity: usize,
    /// Initialization retry bounds
    pub backoff: BackoffConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_millis(100),
            loop_period: Duration::from_millis(10),
            calibration_samples: DEFAULT_CALIBRATION_SAMPLES,
            max_sample_age: Duration::from_secs(1),
            channel_capacity: 64,
            backoff: BackoffConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let b = BackoffConfig::default();
        assert_eq!(b.delay_for(0), Duration::from_secs(4));
        assert_eq!(b.delay_for(1), Duration::from_secs(8));
        assert_eq!(b.delay_for(3), Duration::from_secs(32));
        // 4 · 2⁴ = 64 > cap
        assert_eq!(b.delay_for(4), Duration::from_secs(60));
        assert_eq!(b.delay_for(20), Duration::from_secs(60));
    }
}

//! Initial Sensor Calibration
//!
//! ## Overview
//!
//! Each sensor reports values in its own arbitrary frame at power-on: the
//! barometer reads absolute altitude at the pad, the IMU carries mounting
//! bias on every axis. Before a supervisor enters its `Ready` state it
//! averages the first N raw samples and subtracts that baseline from all
//! subsequent readings, giving relative altitude and de-biased attitude.
//!
//! This module holds only the arithmetic; the ingestion supervisor owns
//! the sampling cadence and the state transition. Keeping the accumulator
//! pure makes calibration testable without a clock.

/// Default number of raw samples averaged into the baseline
pub const DEFAULT_CALIBRATION_SAMPLES: u32 = 50;

/// Running average over the first N samples of up to three components
///
/// One accumulator handles every sensor shape: the barometer uses a single
/// component, the IMU uses three (roll, pitch, yaw). Unused components
/// stay at zero offset.
#[derive(Debug, Clone)]
pub struct CalibrationAccumulator {
    sums: [f64; 3],
    count: u32,
    target: u32,
}

impl CalibrationAccumulator {
    /// Create an accumulator that completes after `target` samples
    pub fn new(target: u32) -> Self {
        Self {
            sums: [0.0; 3],
            count: 0,
            target: target.max(1),
        }
    }

    /// Feed one raw sample; returns true once the baseline is complete
    ///
    /// Progress is logged every 10 samples so startup telemetry shows
    /// calibration advancing.
    pub fn add(&mut self, sample: [f64; 3]) -> bool {
        if self.is_complete() {
            return true;
        }
        for (sum, value) in self.sums.iter_mut().zip(sample) {
            *sum += value;
        }
        self.count += 1;
        if self.count % 10 == 0 {
            log_info!(
                "Calibration progress: {}%",
                self.count * 100 / self.target
            );
        }
        self.is_complete()
    }

    /// Whether enough samples have been accumulated
    pub const fn is_complete(&self) -> bool {
        self.count >= self.target
    }

    /// Samples accumulated so far
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// The computed baseline, `None` until complete
    pub fn offsets(&self) -> Option<[f64; 3]> {
        if !self.is_complete() {
            return None;
        }
        let n = self.count as f64;
        Some([self.sums[0] / n, self.sums[1] / n, self.sums[2] / n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_unavailable_until_complete() {
        let mut cal = CalibrationAccumulator::new(3);
        assert!(!cal.add([10.0, 0.0, 0.0]));
        assert_eq!(cal.offsets(), None);

        assert!(!cal.add([20.0, 0.0, 0.0]));
        assert!(cal.add([30.0, 0.0, 0.0]));

        let offsets = cal.offsets().unwrap();
        assert_eq!(offsets[0], 20.0);
    }

    #[test]
    fn extra_samples_ignored_after_completion() {
        let mut cal = CalibrationAccumulator::new(2);
        cal.add([1.0, 2.0, 3.0]);
        cal.add([3.0, 4.0, 5.0]);
        assert!(cal.add([100.0, 100.0, 100.0]));

        assert_eq!(cal.offsets(), Some([2.0, 3.0, 4.0]));
    }
}

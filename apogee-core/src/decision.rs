//! Parachute Deployment Decision Engine
//!
//! ## Overview
//!
//! Evaluates four independent deployment criteria once per orchestrator
//! cycle and produces a one-shot decision with a human-readable reason.
//! The criteria run in fixed priority order and short-circuit: the first
//! one that fires names the reason, later ones are not evaluated.
//!
//! ```text
//! 1. Altitude descent   stateful, windowed trend with hysteresis
//! 2. Critical angle     stateless, |roll| + |pitch| threshold
//! 3. Force ejection     external override via the persistence sink
//! 4. Critical area      geometric downrange-vs-altitude cone
//! ```
//!
//! The force-ejection criterion is an asynchronous query against the
//! persistence sink, so it is owned by the runtime evaluator; this module
//! supplies the record tag and flag payload it matches on. The sync
//! [`DecisionEngine::evaluate`] entry point takes the already-resolved
//! flag for callers that have it.
//!
//! ## Hysteresis
//!
//! Barometric altitude is noisy; a single descending sample must never
//! deploy. The altitude criterion therefore:
//! - keeps a sliding window of in-range samples and compares the last two
//!   window means (trend detection),
//! - counts consecutive strict decreases while the mean is still above
//!   `no_deploy_altitude`,
//! - resets the count to zero on any non-decrease — noise or ascent
//!   cancels partial confirmation, no credit carries across an ascent,
//! - fires only once the count reaches `falling_confirmation_threshold`.
//!
//! ## Audit
//!
//! Every evaluation is logged with its full context (decision, reason,
//! raw inputs, hysteresis counter, last moving average). This is a
//! required side effect for post-flight analysis, not optional telemetry.

use crate::errors::ConfigError;
use crate::fusion::Vec3;
use crate::window::{SampleWindow, MAX_WINDOW_SIZE};

use libm::{fabs, sqrt};

/// Persistence record tag carrying the force-ejection override
pub const FORCE_EJECT_TAG: &str = "FE";

/// Payload value that marks the override as active
pub const FORCE_EJECT_ACTIVE: &str = "1";

/// Why (or why not) the engine decided to deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeployReason {
    /// Confirmed descent trend in the altitude window
    AltitudeDescent,
    /// Combined roll/pitch angle beyond the critical threshold
    CriticalAngle,
    /// External force-ejection override was set
    ForceEjection,
    /// Vehicle outside the allowed downrange cone
    CriticalArea,
    /// No criterion met this cycle
    None,
}

impl DeployReason {
    /// Human-readable reason, used in audit logs and persistence records
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeployReason::AltitudeDescent => "Altitude descent",
            DeployReason::CriticalAngle => "Critical angle",
            DeployReason::ForceEjection => "Force ejection",
            DeployReason::CriticalArea => "Critical area",
            DeployReason::None => "No deployment needed",
        }
    }
}

/// Outcome of one evaluation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeploymentDecision {
    /// Whether the orchestrator should trigger actuation
    pub should_deploy: bool,
    /// First criterion that fired, or `None`
    pub reason: DeployReason,
}

impl DeploymentDecision {
    /// A no-deploy decision
    pub const fn hold() -> Self {
        Self {
            should_deploy: false,
            reason: DeployReason::None,
        }
    }

    /// A deploy decision for the given reason
    pub const fn deploy(reason: DeployReason) -> Self {
        Self {
            should_deploy: true,
            reason,
        }
    }
}

/// Tunable thresholds for the four criteria
///
/// Constructed once at startup and moved into the engine; no ambient
/// global configuration.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecisionConfig {
    /// Altitude samples per moving-average window
    pub window_size: usize,
    /// Consecutive falling windows required to confirm descent
    pub falling_confirmation_threshold: u32,
    /// Mean altitude below which descent no longer counts toward
    /// confirmation (too close to the ground to deploy usefully)
    pub no_deploy_altitude: f64,
    /// Upper bound of the operationally valid altitude band
    pub estimated_max_altitude: f64,
    /// Lower bound of the operationally valid altitude band
    pub estimated_min_altitude: f64,
    /// Cone slope for the critical-area check
    pub initial_theta: f64,
    /// |roll| + |pitch| (degrees) at which attitude alone deploys
    pub critical_angle_threshold: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            falling_confirmation_threshold: 3,
            no_deploy_altitude: 100.0,
            estimated_max_altitude: 1000.0,
            estimated_min_altitude: 0.0,
            initial_theta: 0.5,
            critical_angle_threshold: 70.0,
        }
    }
}

/// Stateful evaluator of the deployment criteria
///
/// Window, moving-average tail, and hysteresis counter live for the
/// process lifetime of one engine; they are never reset except by
/// restart.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: DecisionConfig,
    window: SampleWindow<MAX_WINDOW_SIZE>,
    /// Tail of the moving-average history; only the last two means are
    /// ever consulted, so only the previous one is kept.
    last_mean: Option<f64>,
    falling_count: u32,
}

impl DecisionEngine {
    /// Create an engine, validating the configuration
    pub fn new(config: DecisionConfig) -> Result<Self, ConfigError> {
        if config.estimated_min_altitude >= config.estimated_max_altitude {
            return Err(ConfigError::AltitudeRange {
                min: config.estimated_min_altitude,
                max: config.estimated_max_altitude,
            });
        }
        let window = SampleWindow::new(config.window_size)?;
        Ok(Self {
            config,
            window,
            last_mean: None,
            falling_count: 0,
        })
    }

    /// Current hysteresis counter (audit context)
    pub const fn falling_count(&self) -> u32 {
        self.falling_count
    }

    /// Most recent window mean, if the window has ever filled
    pub const fn last_moving_average(&self) -> Option<f64> {
        self.last_mean
    }

    /// Whether descent is currently confirmed, without consuming a sample
    ///
    /// The descent criterion is paced by the altimeter: callers evaluating
    /// between samples (or holding an unusable sample) consult the standing
    /// confirmation state instead of feeding the window.
    pub fn falling_confirmed(&self) -> bool {
        self.falling_count >= self.config.falling_confirmation_threshold
            && self.window.is_full()
    }

    /// Criterion 1: confirmed altitude descent with hysteresis
    ///
    /// Samples outside `[estimated_min_altitude, estimated_max_altitude]`
    /// are ignored entirely — not buffered, and not allowed to disturb
    /// the trend state. Means are only computed once the window is full.
    pub fn altitude_descent(&mut self, altitude: f64) -> bool {
        let in_range = altitude >= self.config.estimated_min_altitude
            && altitude <= self.config.estimated_max_altitude;
        if !in_range {
            log_info!(
                "Altitude sample {} outside valid band, ignored",
                altitude
            );
            return self.falling_confirmed();
        }

        self.window.push(altitude);
        let Some(mean) = self.window.mean() else {
            return false;
        };

        match self.last_mean {
            Some(previous) if previous > mean => {
                if mean > self.config.no_deploy_altitude {
                    self.falling_count += 1;
                    log_info!("Descent detected. Falling count: {}", self.falling_count);
                } else {
                    log_info!(
                        "Descent detected but below no-deploy altitude. Current mean: {}",
                        mean
                    );
                }
            }
            Some(_) => {
                self.falling_count = 0;
                log_info!("Ascent or stable altitude detected.");
            }
            None => {}
        }
        self.last_mean = Some(mean);

        if self.falling_count >= self.config.falling_confirmation_threshold {
            log_warn!("Altitude descent confirmed");
            return true;
        }
        false
    }

    /// Criterion 2: combined roll/pitch beyond the critical angle
    ///
    /// Stateless and single-sample; symmetric in sign.
    pub fn critical_angle(&self, roll: f64, pitch: f64) -> bool {
        let angle_sum = fabs(roll) + fabs(pitch);
        if angle_sum >= self.config.critical_angle_threshold {
            log_warn!(
                "Critical angle detected: roll={} pitch={} sum={}",
                roll,
                pitch,
                angle_sum
            );
            return true;
        }
        log_info!("Current angle: roll={} pitch={} sum={}", roll, pitch, angle_sum);
        false
    }

    /// Criterion 4: outside the allowed downrange cone
    ///
    /// `height = sqrt(x² + y²) · initial_theta`; the vehicle is in the
    /// critical area when that allowance is smaller than |z|.
    pub fn critical_area(&self, position: Vec3) -> bool {
        let [x, y, z] = position;
        let height = sqrt(x * x + y * y) * self.config.initial_theta;
        if height < fabs(z) {
            log_warn!(
                "In critical area: allowed height={} actual z={}",
                height,
                z
            );
            return true;
        }
        log_info!("Not in critical area: allowed height={} actual z={}", height, z);
        false
    }

    /// One evaluation cycle over the full criteria set
    ///
    /// `force_ejection` is the already-resolved override flag. The async
    /// runtime evaluator resolves it lazily between criteria 2 and 4 so a
    /// sink query only happens when neither sensor criterion fired; this
    /// entry point preserves the same priority order and short-circuit.
    pub fn evaluate(
        &mut self,
        altitude: f64,
        orientation: Vec3,
        position: Vec3,
        force_ejection: bool,
    ) -> DeploymentDecision {
        let decision = if self.altitude_descent(altitude) {
            DeploymentDecision::deploy(DeployReason::AltitudeDescent)
        } else if self.critical_angle(orientation[0], orientation[1]) {
            DeploymentDecision::deploy(DeployReason::CriticalAngle)
        } else if force_ejection {
            log_warn!("Force ejection active.");
            DeploymentDecision::deploy(DeployReason::ForceEjection)
        } else if self.critical_area(position) {
            DeploymentDecision::deploy(DeployReason::CriticalArea)
        } else {
            DeploymentDecision::hold()
        };

        self.log_evaluation(decision, altitude, orientation, position);
        decision
    }

    /// Emit the audit record for one evaluation
    ///
    /// Public so the async evaluator can log after resolving the
    /// force-ejection flag itself.
    pub fn log_evaluation(
        &self,
        decision: DeploymentDecision,
        altitude: f64,
        orientation: Vec3,
        position: Vec3,
    ) {
        log_info!(
            "Decision log: decision={} reason={:?} altitude={} orientation={:?} position={:?} falling_count={} moving_average={:?}",
            if decision.should_deploy { "Deploy" } else { "No Deploy" },
            decision.reason.as_str(),
            altitude,
            orientation,
            position,
            self.falling_count,
            self.last_mean,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(DecisionConfig::default()).unwrap()
    }

    #[test]
    fn rejects_inverted_altitude_band() {
        let config = DecisionConfig {
            estimated_min_altitude: 500.0,
            estimated_max_altitude: 100.0,
            ..DecisionConfig::default()
        };
        assert!(DecisionEngine::new(config).is_err());
    }

    #[test]
    fn descent_confirmed_by_eighth_sample() {
        // Worked scenario: window 5, threshold 3, band [0, 1000],
        // no-deploy 100. Window fills at sample 5; the first comparable
        // mean pair appears at sample 6.
        let mut e = engine();
        let samples = [500.0, 480.0, 460.0, 440.0, 420.0, 400.0, 380.0, 360.0];

        let mut fired_at = None;
        for (i, s) in samples.iter().enumerate() {
            if e.altitude_descent(*s) && fired_at.is_none() {
                fired_at = Some(i + 1);
            }
        }
        assert_eq!(fired_at, Some(8));
        assert_eq!(e.falling_count(), 3);
    }

    #[test]
    fn ascent_resets_partial_confirmation() {
        let mut e = engine();
        // Two falling windows...
        for s in [500.0, 480.0, 460.0, 440.0, 420.0, 400.0, 380.0] {
            assert!(!e.altitude_descent(s));
        }
        assert_eq!(e.falling_count(), 2);

        // ...then one ascent cancels everything.
        assert!(!e.altitude_descent(600.0));
        assert_eq!(e.falling_count(), 0);

        // Descent must re-confirm from scratch.
        assert!(!e.altitude_descent(380.0));
        assert!(!e.altitude_descent(360.0));
    }

    #[test]
    fn out_of_range_samples_ignored_entirely() {
        let mut e = engine();
        for s in [500.0, 480.0, 460.0, 440.0, 420.0, 400.0, 380.0] {
            e.altitude_descent(s);
        }
        let count_before = e.falling_count();
        let mean_before = e.last_moving_average();

        // Outside [0, 1000]: dropped, no mean recomputed, no reset.
        e.altitude_descent(1500.0);
        e.altitude_descent(-5.0);
        assert_eq!(e.falling_count(), count_before);
        assert_eq!(e.last_moving_average(), mean_before);
    }

    #[test]
    fn descent_below_no_deploy_does_not_count() {
        let config = DecisionConfig {
            no_deploy_altitude: 450.0,
            ..DecisionConfig::default()
        };
        let mut e = DecisionEngine::new(config).unwrap();
        // Strictly falling, but the means sit below 450 from the start.
        for s in [440.0, 430.0, 420.0, 410.0, 400.0, 390.0, 380.0, 370.0] {
            assert!(!e.altitude_descent(s));
        }
        assert_eq!(e.falling_count(), 0);
    }

    #[test]
    fn critical_angle_threshold_and_symmetry() {
        let e = engine();
        assert!(e.critical_angle(40.0, 30.0)); // 70 >= 70
        assert!(e.critical_angle(-40.0, -30.0));
        assert!(e.critical_angle(40.0, -30.0));
        assert!(!e.critical_angle(30.0, 30.0));
    }

    #[test]
    fn critical_area_worked_examples() {
        let e = engine(); // initial_theta = 0.5
        assert!(e.critical_area([100.0, 0.0, 300.0])); // 50 < 300
        assert!(!e.critical_area([1000.0, 0.0, 300.0])); // 500 >= 300
    }

    #[test]
    fn priority_order_short_circuits() {
        // Critical angle and critical area both true: angle wins.
        let mut e = engine();
        let d = e.evaluate(350.0, [60.0, 30.0, 0.0], [100.0, 0.0, 300.0], true);
        assert!(d.should_deploy);
        assert_eq!(d.reason, DeployReason::CriticalAngle);
    }

    #[test]
    fn force_ejection_beats_critical_area() {
        let mut e = engine();
        let d = e.evaluate(350.0, [10.0, 10.0, 0.0], [100.0, 0.0, 300.0], true);
        assert_eq!(d.reason, DeployReason::ForceEjection);
    }

    #[test]
    fn hold_when_nothing_fires() {
        let mut e = engine();
        let d = e.evaluate(350.0, [10.0, 10.0, 0.0], [1000.0, 0.0, 300.0], false);
        assert!(!d.should_deploy);
        assert_eq!(d.reason, DeployReason::None);
    }
}

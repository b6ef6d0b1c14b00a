//! Async Decision Evaluation
//!
//! Bridges the pure [`DecisionEngine`] and the persistence sink. Three of
//! the four criteria are local computations; force ejection is a query
//! for the most recent `"FE"` record, which only makes sense async and
//! only needs to run when neither higher-priority criterion already
//! fired. This wrapper preserves the engine's fixed priority order and
//! short-circuit while keeping the core crate free of I/O.
//!
//! A failed or empty query means the override is not active: fail-open
//! for this criterion only, the critical-area check still runs.

use std::sync::Arc;

use apogee_core::decision::{FORCE_EJECT_ACTIVE, FORCE_EJECT_TAG};
use apogee_core::{DecisionEngine, DeployReason, DeploymentDecision, Vec3};

use crate::sink::PersistenceSink;

/// Per-cycle decision entry point for the orchestrator
pub struct DecisionEvaluator {
    engine: DecisionEngine,
    sink: Arc<dyn PersistenceSink>,
}

impl DecisionEvaluator {
    /// Wrap an engine with the sink used for the override query
    pub fn new(engine: DecisionEngine, sink: Arc<dyn PersistenceSink>) -> Self {
        Self { engine, sink }
    }

    /// Evaluate all criteria in priority order with short-circuit
    ///
    /// The descent window is paced by the altimeter, not the decision
    /// cycle: `fresh_altitude` marks cycles where `altitude` is a new
    /// sample. Between samples the criterion reads its standing
    /// confirmation state — re-feeding the unchanged value would read as
    /// a flat trend and cancel a descent in progress.
    ///
    /// Logs the full audit context for every evaluation, deploy or not.
    pub async fn decide(
        &mut self,
        altitude: f64,
        fresh_altitude: bool,
        orientation: Vec3,
        position: Vec3,
    ) -> DeploymentDecision {
        let descending = if fresh_altitude {
            self.engine.altitude_descent(altitude)
        } else {
            self.engine.falling_confirmed()
        };

        let decision = if descending {
            DeploymentDecision::deploy(DeployReason::AltitudeDescent)
        } else if self.engine.critical_angle(orientation[0], orientation[1]) {
            DeploymentDecision::deploy(DeployReason::CriticalAngle)
        } else if self.force_ejection_active().await {
            DeploymentDecision::deploy(DeployReason::ForceEjection)
        } else if self.engine.critical_area(position) {
            DeploymentDecision::deploy(DeployReason::CriticalArea)
        } else {
            DeploymentDecision::hold()
        };

        self.engine
            .log_evaluation(decision, altitude, orientation, position);
        decision
    }

    /// Criterion 3: the externally injected override flag
    async fn force_ejection_active(&self) -> bool {
        match self.sink.get_latest(FORCE_EJECT_TAG).await {
            Ok(Some(record)) if record.payload == FORCE_EJECT_ACTIVE => {
                log::warn!("Force ejection active.");
                true
            }
            Ok(_) => {
                log::info!("Force ejection not active.");
                false
            }
            Err(e) => {
                // Fail open toward no-deploy for this criterion only.
                log::error!("Error checking force ejection: {e}");
                false
            }
        }
    }
}

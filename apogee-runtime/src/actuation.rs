//! Actuation Gateway — One-Shot Deployment Latch
//!
//! ## Overview
//!
//! Parachute deployment is irreversible: once the charge fires or the
//! servo releases, there is no second chance and no undo. The gateway
//! therefore has exactly one job beyond calling the hardware — guarantee
//! **at-most-one physical actuation** no matter how the orchestrator
//! cycle races manual triggers or re-entrant decisions.
//!
//! The check-and-set is a single `AtomicBool::compare_exchange`: whoever
//! wins the exchange fires the actuator; everyone else gets a logged
//! no-op. The latch is monotonic — it stays set even when the actuator
//! reports a fatal hardware error, because a partially-fired mechanism
//! must never be fired again. The error is surfaced to the operator
//! instead.
//!
//! ## Audit Marker
//!
//! A successful deploy queues one timestamped record (human-readable wall
//! clock, tag `"DEPLOY"`) to the persistence writer. Ground crews use it
//! as the external proof-of-deployment marker.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::sink::Record;

/// Persistence tag for the deployment audit marker
pub const DEPLOY_TAG: &str = "DEPLOY";

/// Actuation failures
#[derive(Debug, Error)]
pub enum ActuationError {
    /// The hardware reported an unrecoverable failure (fatal)
    #[error("Actuator hardware failure: {0}")]
    Hardware(String),
}

/// The physical release mechanism (servo or pyro relay)
///
/// External collaborator; implementations own GPIO/PWM details and must
/// release those resources in `Drop`.
pub trait Actuator: Send {
    /// Fire the mechanism; called at most once per latch lifetime
    fn fire(&mut self) -> Result<(), ActuationError>;
}

/// Idempotent deploy gateway around an [`Actuator`]
pub struct DeploymentLatch<A: Actuator> {
    deployed: AtomicBool,
    actuator: std::sync::Mutex<A>,
    audit_tx: mpsc::Sender<Record>,
}

impl<A: Actuator> DeploymentLatch<A> {
    /// Wrap an actuator; `audit_tx` feeds the persistence writer
    pub fn new(actuator: A, audit_tx: mpsc::Sender<Record>) -> Self {
        Self {
            deployed: AtomicBool::new(false),
            actuator: std::sync::Mutex::new(actuator),
            audit_tx,
        }
    }

    /// Whether deployment has been triggered
    pub fn is_deployed(&self) -> bool {
        self.deployed.load(Ordering::Acquire)
    }

    /// Trigger deployment exactly once
    ///
    /// The second and every later call is a logged no-op returning
    /// `Ok(())` — repeated triggers are expected under racing criteria
    /// and are not an error condition.
    pub fn deploy(&self, reason: &str) -> Result<(), ActuationError> {
        if self
            .deployed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("Parachute already deployed; ignoring trigger ({reason})");
            return Ok(());
        }

        log::warn!("Deploying parachute: {reason}");
        // Latch stays set even on failure: a partially-fired mechanism
        // must not be fired twice.
        self.actuator
            .lock()
            .expect("actuator mutex poisoned")
            .fire()?;

        self.queue_audit_marker(reason);
        Ok(())
    }

    fn queue_audit_marker(&self, reason: &str) {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let record = Record::new(DEPLOY_TAG, format!("{stamp} {reason}"));
        if self.audit_tx.try_send(record).is_err() {
            log::error!("Deployment audit record dropped: persistence queue unavailable");
        }
        log::info!("Deployment logged at {stamp}");
    }
}

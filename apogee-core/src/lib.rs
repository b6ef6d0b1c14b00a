//! Core decision engine for Apogee
//!
//! Handles sensor fusion and the parachute deployment decision for a
//! rocket recovery system. Designed so the flight-critical logic is a
//! pure, deterministic library: no clocks, no I/O, no allocation in the
//! evaluation path.
//!
//! Key constraints:
//! - Deployment is one-shot and irreversible; every evaluation is auditable
//! - Per-criterion failures must not prevent evaluation of the others
//! - Runs on small targets (no_std capable, fixed-size buffers)
//!
//! ```no_run
//! use apogee_core::{DecisionEngine, DecisionConfig};
//!
//! let mut engine = DecisionEngine::new(DecisionConfig::default()).unwrap();
//!
//! // One evaluation cycle with the current snapshot
//! let decision = engine.evaluate(350.0, [30.0, 45.0, 0.0], [100.0, 100.0, 300.0], false);
//! if decision.should_deploy {
//!     // hand off to the actuation gateway
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

// Optional logging: audit logging is a required side effect of every
// decision evaluation, but the facade is only available with `log`.
#[cfg(feature = "log")]
macro_rules! log_info {
    ($($arg:tt)*) => { log::info!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_info {
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}

#[cfg(feature = "log")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}

pub mod calib;
pub mod decision;
pub mod errors;
pub mod fusion;
pub mod reading;
pub mod traits;
pub mod window;

// Public API
pub use decision::{DecisionConfig, DecisionEngine, DeployReason, DeploymentDecision};
pub use errors::{ConfigError, SensorError, SensorResult};
pub use fusion::{ComplementaryFilter, FilterConfig, FusedState, Vec3};
pub use reading::{SensorKind, SensorReading};
pub use traits::SensorSource;

/// Version of the apogee-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

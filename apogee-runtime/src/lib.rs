//! Concurrent Flight Runtime for Apogee
//!
//! ## Overview
//!
//! Wires the pure decision core into a cooperative task architecture:
//!
//! ```text
//! SensorSource ─→ IngestionSupervisor ─→ per-sensor queue ─┐
//! SensorSource ─→ IngestionSupervisor ─→ per-sensor queue ─┼─→ Orchestrator
//! SensorSource ─→ IngestionSupervisor ─→ per-sensor queue ─┘      │
//!                                                    ┌────────────┤
//!                                                    ↓            ↓
//!                                            DeploymentLatch  PersistenceWriter
//! ```
//!
//! One tokio task per sensor supervisor, one for the orchestrator loop,
//! one for the persistence writer. Tasks communicate exclusively through
//! bounded FIFO channels; the only shared mutable state outside a channel
//! is the atomic deployment latch.
//!
//! ## Failure Containment
//!
//! - A sensor failure is confined to its supervisor: retry with bounded
//!   backoff, then keep retrying across cycles forever. No other task
//!   notices.
//! - Persistence failures are logged and dropped; the control loop never
//!   blocks on storage.
//! - A decision-criterion failure (force-ejection query) fails open for
//!   that criterion only.
//! - The deployment latch guarantees at-most-one physical actuation even
//!   when the orchestrator races an external trigger.
//!
//! ## Shutdown
//!
//! Every task selects on a shared watch channel. Flipping it stops
//! ingestion and orchestration cooperatively; sensor sources and
//! actuators are dropped on task exit, releasing hardware on every exit
//! path, including error paths.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod actuation;
pub mod config;
pub mod decision;
pub mod orchestrator;
pub mod shutdown;
pub mod sink;
pub mod supervisor;

// Re-export common types
pub use actuation::{ActuationError, Actuator, DeploymentLatch};
pub use config::{BackoffConfig, RuntimeConfig};
pub use decision::DecisionEvaluator;
pub use orchestrator::{Orchestrator, SensorChannels, Snapshot};
pub use shutdown::{ShutdownController, ShutdownSignal};
pub use sink::{MemorySink, PersistenceSink, PersistenceWriter, Record, RetryPolicy, SinkError};
pub use supervisor::IngestionSupervisor;

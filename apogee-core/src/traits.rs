//! Core Traits and Abstractions
//!
//! The hardware seam of the pipeline. Drivers (I2C barometer, serial IMU,
//! serial GPS) live outside this workspace; the ingestion supervisors
//! consume them exclusively through [`SensorSource`], so the orchestration
//! code never depends on a concrete sensor type.
//!
//! ## Design Philosophy
//!
//! - **Closed reading set, open driver set**: any driver can implement
//!   the trait, but everything it emits is one of the
//!   [`SensorReading`](crate::reading::SensorReading) variants.
//! - **Blocking allowed**: `read()` may block on hardware I/O. Callers
//!   must isolate each source in its own task so one slow or wedged
//!   sensor never stalls the others or the orchestrator.
//! - **Explicit failure**: errors are values, not exceptions. A
//!   `ReadFailed` return forces the supervisor back through
//!   initialization before the source is trusted again.

use crate::errors::SensorResult;
use crate::reading::{SensorKind, SensorReading};

/// A physical sensor consumed by one ingestion supervisor
///
/// Contract:
/// - `initialize` is fallible and may be retried with backoff; it must be
///   safe to call again after a failure or after a mid-stream read error.
/// - `read` returns `Ok(None)` when no fresh sample is available (e.g.
///   nothing in the serial buffer); that is not an error and must not
///   trigger re-initialization.
/// - Dropping the source releases its hardware resources.
pub trait SensorSource {
    /// Which orchestrator channel this source feeds
    fn kind(&self) -> SensorKind;

    /// Stable name for logs and persistence tags
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Bring the hardware up; fallible, retryable
    fn initialize(&mut self) -> SensorResult<()>;

    /// Take one sample; may block on hardware I/O
    fn read(&mut self) -> SensorResult<Option<SensorReading>>;
}

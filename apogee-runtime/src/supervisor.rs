//! Per-Sensor Ingestion Supervisor
//!
//! ## Overview
//!
//! One supervisor task per sensor source. Each owns the full lifecycle of
//! its sensor and nothing else:
//!
//! ```text
//! Uninitialized ──→ Initializing ──→ Calibrating ──→ Ready
//!       ↑                │ backoff,                    │ read error
//!       │                ↓ bounded attempts            ↓
//!       └────────────────┴─────────────────────────────┘
//! ```
//!
//! - **Initializing**: calls the source's fallible `initialize()`; on
//!   failure retries with bounded exponential backoff (4 s doubling to
//!   60 s, five attempts), then gives up *for this cycle* and re-enters
//!   `Uninitialized`. The outer loop retries forever — a recoverable
//!   sensor reconnects without operator intervention.
//! - **Calibrating**: averages the first N raw samples at the poll
//!   sub-cadence into a baseline offset (relative altitude, de-biased
//!   attitude).
//! - **Ready**: polls at a fixed cadence; good samples go to the queue,
//!   a read error drops the sample and forces re-initialization — a
//!   sensor that failed mid-stream is never silently trusted.
//!
//! ## Isolation Invariant
//!
//! Failure or backoff of one sensor is invisible to every other task.
//! Supervisors share nothing but their outbound queue; a wedged barometer
//! cannot delay the IMU or the orchestrator.

use apogee_core::calib::CalibrationAccumulator;
use apogee_core::{SensorKind, SensorReading, SensorSource};

use tokio::sync::mpsc;

use crate::config::{BackoffConfig, RuntimeConfig};
use crate::shutdown::ShutdownSignal;

/// Supervisor lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Initializing,
    Ready,
}

/// Owns one sensor source and feeds one per-sensor queue
pub struct IngestionSupervisor {
    source: Box<dyn SensorSource + Send>,
    tx: mpsc::Sender<SensorReading>,
    poll_period: std::time::Duration,
    calibration_samples: u32,
    backoff: BackoffConfig,
    offsets: [f64; 3],
    state: State,
}

impl IngestionSupervisor {
    /// Build a supervisor for `source`, delivering into `tx`
    pub fn new(
        source: Box<dyn SensorSource + Send>,
        tx: mpsc::Sender<SensorReading>,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            source,
            tx,
            poll_period: config.poll_period,
            calibration_samples: config.calibration_samples,
            backoff: config.backoff,
            offsets: [0.0; 3],
            state: State::Uninitialized,
        }
    }

    /// Run until shutdown; the source is dropped on return
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let name = self.source.name();
        log::info!("{name} supervisor started");

        while !shutdown.is_triggered() {
            match self.state {
                State::Uninitialized => {
                    self.state = State::Initializing;
                }
                State::Initializing => {
                    if self.initialize_cycle(&mut shutdown).await {
                        self.state = State::Ready;
                    } else {
                        // Attempts exhausted for this cycle; pause, then
                        // the outer loop tries again indefinitely.
                        self.state = State::Uninitialized;
                        if Self::sleep_or_shutdown(self.poll_period, &mut shutdown).await {
                            break;
                        }
                    }
                }
                State::Ready => {
                    self.poll_once();
                    if Self::sleep_or_shutdown(self.poll_period, &mut shutdown).await {
                        break;
                    }
                }
            }
        }
        log::info!("{name} supervisor stopped");
    }

    /// One bounded initialize-with-backoff cycle, then calibration
    ///
    /// Returns true when the sensor reached `Ready`.
    async fn initialize_cycle(&mut self, shutdown: &mut ShutdownSignal) -> bool {
        let name = self.source.name();

        let mut initialized = false;
        for attempt in 0..self.backoff.max_attempts {
            if attempt > 0 {
                let delay = self.backoff.delay_for(attempt - 1);
                log::info!("{name}: retrying initialization in {delay:?}");
                if Self::sleep_or_shutdown(delay, shutdown).await {
                    return false;
                }
            }
            match self.source.initialize() {
                Ok(()) => {
                    initialized = true;
                    break;
                }
                Err(e) => {
                    log::error!(
                        "Error initializing {name} (attempt {}/{}): {e}",
                        attempt + 1,
                        self.backoff.max_attempts
                    );
                }
            }
        }
        if !initialized {
            return false;
        }
        log::info!("{name} sensor initialized successfully");

        match self.calibrate(shutdown).await {
            Some(offsets) => {
                self.offsets = offsets;
                log::info!("{name} calibration complete: {offsets:?}");
                true
            }
            None => false,
        }
    }

    /// Average the first N raw samples into the baseline offset
    ///
    /// GPS fixes are absolute; the position channel skips calibration.
    async fn calibrate(&mut self, shutdown: &mut ShutdownSignal) -> Option<[f64; 3]> {
        if self.source.kind() == SensorKind::Position {
            return Some([0.0; 3]);
        }

        let name = self.source.name();
        log::info!("Calculating initial {name} baseline...");
        let mut accumulator = CalibrationAccumulator::new(self.calibration_samples);

        while !accumulator.is_complete() {
            match self.source.read() {
                Ok(Some(reading)) => {
                    accumulator.add(Self::components(&reading));
                }
                Ok(None) => {} // nothing buffered yet; keep polling
                Err(e) if e.is_recoverable() => {
                    log::error!("Error calibrating {name}: {e}");
                    return None;
                }
                Err(e) => {
                    // Degenerate sample: discard, keep calibrating.
                    log::error!("Discarding calibration sample from {name}: {e}");
                }
            }
            if Self::sleep_or_shutdown(self.poll_period, shutdown).await {
                return None;
            }
        }
        accumulator.offsets()
    }

    /// One `Ready`-state poll
    fn poll_once(&mut self) {
        let name = self.source.name();
        match self.source.read() {
            Ok(Some(reading)) => {
                let adjusted = self.apply_offsets(reading);
                if self.tx.try_send(adjusted).is_err() {
                    log::warn!("{name} queue full; sample dropped");
                }
            }
            Ok(None) => {}
            Err(e) if e.is_recoverable() => {
                // Drop this sample and force re-initialization.
                log::error!("Error in {name}: {e}");
                self.state = State::Uninitialized;
            }
            Err(e) => {
                log::error!("Discarding sample from {name}: {e}");
            }
        }
    }

    /// Subtract the calibration baseline from a reading
    fn apply_offsets(&self, reading: SensorReading) -> SensorReading {
        match reading {
            SensorReading::Altitude { meters } => SensorReading::Altitude {
                meters: meters - self.offsets[0],
            },
            SensorReading::Orientation {
                roll,
                pitch,
                yaw,
                accel,
            } => SensorReading::Orientation {
                roll: roll - self.offsets[0],
                pitch: pitch - self.offsets[1],
                yaw: yaw - self.offsets[2],
                accel,
            },
            position @ SensorReading::Position { .. } => position,
        }
    }

    /// The calibratable components of a reading
    fn components(reading: &SensorReading) -> [f64; 3] {
        match *reading {
            SensorReading::Altitude { meters } => [meters, 0.0, 0.0],
            SensorReading::Orientation {
                roll, pitch, yaw, ..
            } => [roll, pitch, yaw],
            SensorReading::Position { .. } => [0.0; 3],
        }
    }

    /// Sleep for `duration`, returning true if shutdown fired first
    async fn sleep_or_shutdown(
        duration: std::time::Duration,
        shutdown: &mut ShutdownSignal,
    ) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = shutdown.triggered() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apogee_core::errors::{SensorError, SensorResult};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Scripted barometer: each `read()` pops the next step
    struct ScriptedAltimeter {
        init_failures: u32,
        init_count: Arc<AtomicU32>,
        script: VecDeque<SensorResult<Option<SensorReading>>>,
    }

    impl SensorSource for ScriptedAltimeter {
        fn kind(&self) -> SensorKind {
            SensorKind::Altitude
        }

        fn initialize(&mut self) -> SensorResult<()> {
            let n = self.init_count.fetch_add(1, Ordering::SeqCst);
            if n < self.init_failures {
                return Err(SensorError::InitFailed { reason: "i2c bus" });
            }
            Ok(())
        }

        fn read(&mut self) -> SensorResult<Option<SensorReading>> {
            self.script
                .pop_front()
                .unwrap_or(Ok(Some(SensorReading::Altitude { meters: 100.0 })))
        }
    }

    fn test_config() -> RuntimeConfig {
        RuntimeConfig {
            poll_period: Duration::from_millis(10),
            calibration_samples: 2,
            ..RuntimeConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn calibration_offsets_applied_to_readings() {
        // First two reads (120, 80) form the baseline 100; later samples
        // arrive relative to it.
        let script: VecDeque<_> = [
            Ok(Some(SensorReading::Altitude { meters: 120.0 })),
            Ok(Some(SensorReading::Altitude { meters: 80.0 })),
            Ok(Some(SensorReading::Altitude { meters: 150.0 })),
        ]
        .into();

        let (tx, mut rx) = mpsc::channel(16);
        let (controller, signal) = crate::shutdown::channel();
        let supervisor = IngestionSupervisor::new(
            Box::new(ScriptedAltimeter {
                init_failures: 0,
                init_count: Arc::new(AtomicU32::new(0)),
                script,
            }),
            tx,
            &test_config(),
        );
        let handle = tokio::spawn(supervisor.run(signal));

        let reading = rx.recv().await.unwrap();
        assert_eq!(reading, SensorReading::Altitude { meters: 50.0 });

        controller.trigger();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn read_error_forces_reinitialization() {
        let init_count = Arc::new(AtomicU32::new(0));
        let script: VecDeque<_> = [
            // calibration
            Ok(Some(SensorReading::Altitude { meters: 0.0 })),
            Ok(Some(SensorReading::Altitude { meters: 0.0 })),
            // one good sample, then a mid-stream failure
            Ok(Some(SensorReading::Altitude { meters: 10.0 })),
            Err(SensorError::ReadFailed { reason: "timeout" }),
            // second calibration pass after re-init
            Ok(Some(SensorReading::Altitude { meters: 0.0 })),
            Ok(Some(SensorReading::Altitude { meters: 0.0 })),
            Ok(Some(SensorReading::Altitude { meters: 20.0 })),
        ]
        .into();

        let (tx, mut rx) = mpsc::channel(16);
        let (controller, signal) = crate::shutdown::channel();
        let supervisor = IngestionSupervisor::new(
            Box::new(ScriptedAltimeter {
                init_failures: 0,
                init_count: init_count.clone(),
                script,
            }),
            tx,
            &test_config(),
        );
        let handle = tokio::spawn(supervisor.run(signal));

        assert_eq!(
            rx.recv().await.unwrap(),
            SensorReading::Altitude { meters: 10.0 }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            SensorReading::Altitude { meters: 20.0 }
        );
        // The failure between the two samples triggered a second init.
        assert_eq!(init_count.load(Ordering::SeqCst), 2);

        controller.trigger();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn init_failures_retry_with_bounded_attempts() {
        let init_count = Arc::new(AtomicU32::new(0));
        let (tx, mut rx) = mpsc::channel(16);
        let (controller, signal) = crate::shutdown::channel();

        // Fails 7 times: the first cycle exhausts its 5 attempts, the
        // second cycle succeeds on its 3rd attempt.
        let supervisor = IngestionSupervisor::new(
            Box::new(ScriptedAltimeter {
                init_failures: 7,
                init_count: init_count.clone(),
                script: VecDeque::new(),
            }),
            tx,
            &test_config(),
        );
        let handle = tokio::spawn(supervisor.run(signal));

        // Eventually readings flow; initialization recovered across cycles.
        let reading = rx.recv().await.unwrap();
        assert!(matches!(reading, SensorReading::Altitude { .. }));
        assert_eq!(init_count.load(Ordering::SeqCst), 8);

        controller.trigger();
        handle.await.unwrap();
    }
}

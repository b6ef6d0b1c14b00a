//! Orchestrator — Snapshot Aggregation and Decision Cycle
//!
//! ## Overview
//!
//! The orchestrator is the single consumer of every per-sensor queue and
//! the single writer of the fused state. Each cycle (fixed period,
//! default 10 ms):
//!
//! 1. Non-blocking drain of each sensor queue into the snapshot
//!    (latest-value-wins per channel; FIFO order within a channel).
//! 2. Once every required channel has produced at least one value — and
//!    none of them is stale — run the fusion filter and the decision
//!    evaluator against the snapshot.
//! 3. On a deploy decision, trigger the actuation latch exactly once.
//! 4. Forward every ingested sample to the persistence queue.
//!
//! ## Staleness Bound
//!
//! Latest-value-wins alone would let a channel that died ten minutes ago
//! keep feeding its last sample into decisions. Each slot therefore
//! carries the instant it was last updated; if any slot is older than
//! `max_sample_age` the cycle logs a warning and skips evaluation rather
//! than deciding on stale data. The bound is deliberately lax (default
//! 1 s against a 100 ms sensor cadence) so a single missed poll never
//! pauses the engine.

use std::sync::Arc;

use apogee_core::{ComplementaryFilter, SensorReading, Vec3};

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::actuation::{Actuator, DeploymentLatch};
use crate::config::RuntimeConfig;
use crate::decision::DecisionEvaluator;
use crate::shutdown::ShutdownSignal;
use crate::sink::Record;

/// One slot of the aggregated state: the value plus its arrival instant
#[derive(Debug, Clone, Copy)]
struct Slot<T> {
    value: T,
    updated: Instant,
}

/// Latest value per sensor channel
///
/// A slot stays `None` until its channel delivers for the first time; the
/// decision gate requires all three.
#[derive(Default)]
pub struct Snapshot {
    altitude: Option<Slot<f64>>,
    orientation: Option<Slot<([f64; 3], [f64; 3])>>,
    position: Option<Slot<[f64; 2]>>,
}

impl Snapshot {
    /// Fold one reading into its channel slot (latest-value-wins)
    fn update(&mut self, reading: &SensorReading, now: Instant) {
        match *reading {
            SensorReading::Altitude { meters } => {
                self.altitude = Some(Slot {
                    value: meters,
                    updated: now,
                });
            }
            SensorReading::Orientation {
                roll,
                pitch,
                yaw,
                accel,
            } => {
                self.orientation = Some(Slot {
                    value: ([roll, pitch, yaw], accel),
                    updated: now,
                });
            }
            SensorReading::Position {
                latitude,
                longitude,
            } => {
                self.position = Some(Slot {
                    value: [latitude, longitude],
                    updated: now,
                });
            }
        }
    }

    /// True once every required channel has produced at least one value
    pub fn is_complete(&self) -> bool {
        self.altitude.is_some() && self.orientation.is_some() && self.position.is_some()
    }

    /// Age of the oldest slot, `None` until complete
    fn oldest_age(&self, now: Instant) -> Option<std::time::Duration> {
        let slots = [
            self.altitude.as_ref().map(|s| s.updated)?,
            self.orientation.as_ref().map(|s| s.updated)?,
            self.position.as_ref().map(|s| s.updated)?,
        ];
        slots.into_iter().map(|t| now - t).max()
    }
}

/// Receiver ends of the three per-sensor queues
pub struct SensorChannels {
    /// Barometer queue
    pub altitude: mpsc::Receiver<SensorReading>,
    /// IMU queue
    pub orientation: mpsc::Receiver<SensorReading>,
    /// GPS queue
    pub position: mpsc::Receiver<SensorReading>,
}

/// The aggregation and decision loop
pub struct Orchestrator<A: Actuator> {
    channels: SensorChannels,
    snapshot: Snapshot,
    filter: ComplementaryFilter,
    evaluator: DecisionEvaluator,
    latch: Arc<DeploymentLatch<A>>,
    record_tx: mpsc::Sender<Record>,
    loop_period: std::time::Duration,
    max_sample_age: std::time::Duration,
    last_attitude: Option<Vec3>,
}

impl<A: Actuator> Orchestrator<A> {
    /// Wire the loop together; configuration is consumed once here
    pub fn new(
        channels: SensorChannels,
        filter: ComplementaryFilter,
        evaluator: DecisionEvaluator,
        latch: Arc<DeploymentLatch<A>>,
        record_tx: mpsc::Sender<Record>,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            channels,
            snapshot: Snapshot::default(),
            filter,
            evaluator,
            latch,
            record_tx,
            loop_period: config.loop_period,
            max_sample_age: config.max_sample_age,
            last_attitude: None,
        }
    }

    /// Run the cycle until shutdown
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        log::info!("Orchestrator started");
        let mut ticker = tokio::time::interval(self.loop_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.triggered() => {
                    log::info!("Orchestrator stopped");
                    return;
                }
            }
            self.cycle().await;
        }
    }

    /// One aggregation + decision cycle
    async fn cycle(&mut self) {
        let now = Instant::now();
        let fresh_altitude = self.drain_queues(now);

        if !self.snapshot.is_complete() {
            // Not every channel has reported yet; no decision.
            return;
        }
        if let Some(age) = self.snapshot.oldest_age(now) {
            if age > self.max_sample_age {
                log::warn!(
                    "Skipping decision cycle: stalest channel sample is {age:?} old"
                );
                return;
            }
        }

        // Every slot is Some past the completeness gate.
        let altitude = self.snapshot.altitude.as_ref().map(|s| s.value).unwrap_or_default();
        let (attitude, accel) = self
            .snapshot
            .orientation
            .as_ref()
            .map(|s| s.value)
            .unwrap_or_default();
        let fix = self.snapshot.position.as_ref().map(|s| s.value).unwrap_or_default();

        let dt = self.loop_period.as_secs_f64();
        let gyro = self.derive_rates(attitude, dt);
        let fused = self
            .filter
            .update([fix[0], fix[1], altitude], accel, gyro, dt);

        let decision = self
            .evaluator
            .decide(
                altitude,
                fresh_altitude,
                attitude,
                [fused.position[0], fused.position[1], altitude],
            )
            .await;

        if decision.should_deploy && !self.latch.is_deployed() {
            if let Err(e) = self.latch.deploy(decision.reason.as_str()) {
                // Fatal: surface it and leave the latch set; the operator
                // decides whether the process keeps flying.
                log::error!("Actuation failed: {e}");
            }
        }
    }

    /// Drain whatever each queue holds right now; never blocks
    ///
    /// Returns true when the altitude channel delivered at least one new
    /// sample, which paces the descent criterion.
    fn drain_queues(&mut self, now: Instant) -> bool {
        // Split borrows: receivers on one side, snapshot/record_tx on the other.
        let Self {
            channels,
            snapshot,
            record_tx,
            ..
        } = self;

        let mut fresh_altitude = false;
        for rx in [
            &mut channels.altitude,
            &mut channels.orientation,
            &mut channels.position,
        ] {
            while let Ok(reading) = rx.try_recv() {
                fresh_altitude |= matches!(reading, SensorReading::Altitude { .. });
                snapshot.update(&reading, now);
                Self::forward_sample(record_tx, &reading);
            }
        }
        fresh_altitude
    }

    /// Best-effort copy of an ingested sample to the persistence queue
    fn forward_sample(record_tx: &mpsc::Sender<Record>, reading: &SensorReading) {
        let payload = match *reading {
            SensorReading::Altitude { meters } => format!("{meters}"),
            SensorReading::Orientation {
                roll,
                pitch,
                yaw,
                accel,
            } => serde_json::json!({
                "roll": roll, "pitch": pitch, "yaw": yaw, "accel": accel,
            })
            .to_string(),
            SensorReading::Position {
                latitude,
                longitude,
            } => serde_json::json!({ "lat": latitude, "lon": longitude }).to_string(),
        };
        if record_tx
            .try_send(Record::new(reading.kind().tag(), payload))
            .is_err()
        {
            log::warn!("Persistence queue full; {} sample not logged", reading.kind().name());
        }
    }

    /// Finite-difference angular rate from consecutive attitude samples
    ///
    /// The IMU emits fused roll/pitch/yaw rather than raw gyro rates, so
    /// the filter's gyro input is reconstructed from the attitude delta.
    fn derive_rates(&mut self, attitude: Vec3, dt: f64) -> Vec3 {
        let rates = match self.last_attitude {
            Some(prev) => [
                (attitude[0] - prev[0]) / dt,
                (attitude[1] - prev[1]) / dt,
                (attitude[2] - prev[2]) / dt,
            ],
            None => [0.0; 3],
        };
        self.last_attitude = Some(attitude);
        rates
    }
}

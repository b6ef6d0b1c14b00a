//! Persistence Sink — Best-Effort Append-Only Flight Log
//!
//! ## Overview
//!
//! The ground store (typically a pooled relational database) is an
//! external collaborator; this module specifies only its interface and
//! supplies the in-process plumbing around it:
//!
//! - [`PersistenceSink`]: async `append` / `get_latest` trait
//! - [`RetryPolicy`]: bounded attempts with exponential backoff
//! - [`PersistenceWriter`]: the single consumer task draining the record
//!   queue into the sink
//! - [`MemorySink`]: an in-process implementation for tests and bench rigs
//!
//! ## Best Effort, Never Blocking
//!
//! Persistence is an audit concern, not a flight concern. The control
//! loop sends records into a bounded channel and moves on; if storage is
//! slow or down, records are retried a bounded number of times, then
//! dropped with a log line. Nothing here may ever stall the orchestrator.
//!
//! The one read path, `get_latest`, serves the force-ejection override:
//! the most recent record tagged `"FE"` with payload `"1"` forces
//! deployment. A failed query means "not active" — fail-open for that
//! criterion only.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::shutdown::ShutdownSignal;

/// Persistence errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// Transport or backend failure; retryable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the records; not retryable
    #[error("Store rejected records: {0}")]
    Rejected(String),
}

/// One append-only flight log entry
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Record {
    /// Channel tag (`"BMP"`, `"IMU"`, `"GPS"`, `"FE"`, `"DEPLOY"`)
    pub tag: String,
    /// Formatted payload
    pub payload: String,
    /// Milliseconds since the Unix epoch at record creation
    pub timestamp_ms: u64,
}

impl Record {
    /// Create a record stamped with the current wall clock
    pub fn new(tag: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            payload: payload.into(),
            timestamp_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }
    }
}

/// Asynchronous append-only store with a latest-by-tag query
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Append a batch of records
    async fn append(&self, records: &[Record]) -> Result<(), SinkError>;

    /// Most recent record with the given tag, if any
    async fn get_latest(&self, tag: &str) -> Result<Option<Record>, SinkError>;
}

/// Bounded retry with exponential backoff
///
/// Defaults: 3 attempts, waits growing from 4 s and capped at 10 s.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts (first try included)
    pub max_attempts: u32,
    /// Wait after the first failure
    pub initial_delay: Duration,
    /// Upper bound on any wait
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let doubled = self
            .initial_delay
            .saturating_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX));
        doubled.min(self.max_delay)
    }

    /// Run `append` against the sink with this policy
    ///
    /// `Rejected` errors are not retried; retrying a batch the backend
    /// refuses can only lose time.
    pub async fn append_with_retry(
        &self,
        sink: &dyn PersistenceSink,
        records: &[Record],
    ) -> Result<(), SinkError> {
        let mut attempt = 0;
        loop {
            match sink.append(records).await {
                Ok(()) => return Ok(()),
                Err(e @ SinkError::Rejected(_)) => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(e);
                    }
                    log::warn!(
                        "Persistence append failed (attempt {}/{}): {}",
                        attempt,
                        self.max_attempts,
                        e
                    );
                    tokio::time::sleep(self.delay_for(attempt - 1)).await;
                }
            }
        }
    }
}

/// In-process sink for tests and ground-side tooling
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
    latest: Mutex<HashMap<String, Record>>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records appended (test observability)
    pub fn len(&self) -> usize {
        self.records.lock().expect("sink poisoned").len()
    }

    /// True when nothing has been appended
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records with the given tag, oldest first (test observability)
    pub fn records_with_tag(&self, tag: &str) -> Vec<Record> {
        self.records
            .lock()
            .expect("sink poisoned")
            .iter()
            .filter(|r| r.tag == tag)
            .cloned()
            .collect()
    }

    /// Inject the force-ejection override flag
    pub fn set_flag(&self, tag: &str, payload: &str) {
        let record = Record::new(tag, payload);
        self.latest
            .lock()
            .expect("sink poisoned")
            .insert(tag.to_string(), record.clone());
        self.records.lock().expect("sink poisoned").push(record);
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn append(&self, records: &[Record]) -> Result<(), SinkError> {
        let mut latest = self.latest.lock().expect("sink poisoned");
        let mut all = self.records.lock().expect("sink poisoned");
        for record in records {
            latest.insert(record.tag.clone(), record.clone());
            all.push(record.clone());
        }
        Ok(())
    }

    async fn get_latest(&self, tag: &str) -> Result<Option<Record>, SinkError> {
        Ok(self.latest.lock().expect("sink poisoned").get(tag).cloned())
    }
}

/// Writer task: drains the record queue into the sink
///
/// Batches whatever is immediately available on each wakeup so a burst of
/// samples becomes one `append`. Failures after retry are dropped with a
/// log line — the queue is the pressure valve, not the store.
pub struct PersistenceWriter {
    rx: mpsc::Receiver<Record>,
    sink: std::sync::Arc<dyn PersistenceSink>,
    retry: RetryPolicy,
}

impl PersistenceWriter {
    /// Build a writer draining `rx` into `sink`
    pub fn new(
        rx: mpsc::Receiver<Record>,
        sink: std::sync::Arc<dyn PersistenceSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self { rx, sink, retry }
    }

    /// Run until shutdown triggers and the queue is drained
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        log::info!("Persistence writer started");
        loop {
            let first = tokio::select! {
                record = self.rx.recv() => record,
                _ = shutdown.triggered() => None,
            };

            let Some(first) = first else {
                // Shutdown or all senders dropped: flush what's left.
                self.rx.close();
                let mut tail = Vec::new();
                while let Ok(record) = self.rx.try_recv() {
                    tail.push(record);
                }
                if !tail.is_empty() {
                    self.write_batch(&tail).await;
                }
                log::info!("Persistence writer stopped");
                return;
            };

            let mut batch = vec![first];
            while let Ok(record) = self.rx.try_recv() {
                batch.push(record);
            }
            self.write_batch(&batch).await;
        }
    }

    async fn write_batch(&self, batch: &[Record]) {
        if let Err(e) = self.retry.append_with_retry(self.sink.as_ref(), batch).await {
            log::error!("Dropping {} record(s) after retries: {}", batch.len(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Sink that fails a configurable number of appends before recovering
    struct FlakySink {
        inner: MemorySink,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl PersistenceSink for FlakySink {
        async fn append(&self, records: &[Record]) -> Result<(), SinkError> {
            if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            }).is_ok()
            {
                return Err(SinkError::Unavailable("connection reset".into()));
            }
            self.inner.append(records).await
        }

        async fn get_latest(&self, tag: &str) -> Result<Option<Record>, SinkError> {
            self.inner.get_latest(tag).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_from_transient_failure() {
        let sink = FlakySink {
            inner: MemorySink::new(),
            failures_left: AtomicU32::new(2),
        };
        let policy = RetryPolicy::default();

        let records = [Record::new("BMP", "123.4")];
        policy
            .append_with_retry(&sink, &records)
            .await
            .expect("third attempt should succeed");
        assert_eq!(sink.inner.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_bounded_attempts() {
        let sink = FlakySink {
            inner: MemorySink::new(),
            failures_left: AtomicU32::new(10),
        };
        let policy = RetryPolicy::default();

        let records = [Record::new("BMP", "123.4")];
        assert!(policy.append_with_retry(&sink, &records).await.is_err());
        assert!(sink.inner.is_empty());
    }

    #[tokio::test]
    async fn memory_sink_latest_by_tag() {
        let sink = MemorySink::new();
        sink.append(&[Record::new("FE", "0"), Record::new("FE", "1")])
            .await
            .unwrap();

        let latest = sink.get_latest("FE").await.unwrap().unwrap();
        assert_eq!(latest.payload, "1");
        assert!(sink.get_latest("GPS").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writer_drains_queue_into_sink() {
        let sink = Arc::new(MemorySink::new());
        let (tx, rx) = mpsc::channel(16);
        let (controller, signal) = crate::shutdown::channel();

        let writer = PersistenceWriter::new(rx, sink.clone(), RetryPolicy::default());
        let handle = tokio::spawn(writer.run(signal));

        for i in 0..5 {
            tx.send(Record::new("BMP", format!("{i}"))).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        controller.trigger();
        handle.await.unwrap();
        assert_eq!(sink.len(), 5);
    }
}

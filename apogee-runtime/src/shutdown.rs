//! Cooperative Shutdown
//!
//! Every long-running task holds a [`ShutdownSignal`] and selects on it
//! alongside its own work. Triggering the controller stops ingestion,
//! orchestration, and persistence deterministically; hardware handles are
//! released by `Drop` when each task returns, so cleanup happens on every
//! exit path.

use tokio::sync::watch;

/// Owner side of the shutdown channel
///
/// Usually held by `main`; trigger on SIGINT or a fatal actuation error.
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

/// Task-side handle; cheap to clone into every spawned task
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Create a linked controller/signal pair
pub fn channel() -> (ShutdownController, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownController { tx }, ShutdownSignal { rx })
}

impl ShutdownController {
    /// Tell every task to stop
    pub fn trigger(&self) {
        // Receivers may already be gone during teardown; that's fine.
        let _ = self.tx.send(true);
    }

    /// Trigger on ctrl-c, then return
    pub async fn listen_for_interrupt(self) {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received, shutting down pipeline");
            self.trigger();
        }
    }
}

impl ShutdownSignal {
    /// Resolves once shutdown has been triggered
    pub async fn triggered(&mut self) {
        // wait_for returns immediately if the value is already true.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Non-blocking check
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_wakes_all_signals() {
        let (controller, signal) = channel();
        let mut a = signal.clone();
        let mut b = signal;

        assert!(!a.is_triggered());
        controller.trigger();

        a.triggered().await;
        b.triggered().await;
        assert!(b.is_triggered());
    }
}

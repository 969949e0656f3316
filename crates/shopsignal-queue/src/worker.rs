//! Single scheduler for queue drains.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::queue::DeliveryQueue;

/// Handle for a running [`QueueWorker`].
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop the worker after its current drain and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.join.await;
    }
}

/// Drains on a fixed cadence and right after each enqueue. The only task that
/// calls [`DeliveryQueue::drain`] in a running service.
pub struct QueueWorker {
    queue: Arc<DeliveryQueue>,
    interval: Duration,
}

impl QueueWorker {
    pub fn new(queue: Arc<DeliveryQueue>, interval: Duration) -> Self {
        Self { queue, interval }
    }

    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let join = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });
        WorkerHandle { shutdown_tx, join }
    }

    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        info!(interval_ms = self.interval.as_millis() as u64, "queue worker started");
        let notify = self.queue.notifier();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {}
                _ = notify.notified() => {}
            }

            let report = self.queue.drain().await;
            if report.attempted > 0 || report.parked > 0 {
                debug!(
                    attempted = report.attempted,
                    delivered = report.delivered,
                    failed = report.failed,
                    parked = report.parked,
                    "drain finished"
                );
            }
        }
        info!("queue worker stopped");
    }
}

//! Background workers that drain the generation queue.

use std::sync::Arc;

use tracing::{error, info};

use crate::core::generation::executor::UnitExecutor;
use crate::core::generation::queue::JobQueue;

/// A pool of polling workers sharing one queue and executor. Each worker
/// sleeps for the poll interval, claims the next eligible unit, and runs it
/// to a resting state.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    executor: Arc<UnitExecutor>,
    worker_count: usize,
    poll_interval: tokio::time::Duration,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<JobQueue>,
        executor: Arc<UnitExecutor>,
        worker_count: usize,
        poll_interval: tokio::time::Duration,
    ) -> Self {
        Self {
            queue,
            executor,
            worker_count: worker_count.max(1),
            poll_interval,
        }
    }

    /// Run all workers until the queue signals shutdown.
    pub async fn run(&self) {
        let mut handles = Vec::with_capacity(self.worker_count);
        for worker_id in 0..self.worker_count {
            let queue = self.queue.clone();
            let executor = self.executor.clone();
            let poll_interval = self.poll_interval;
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, executor, poll_interval).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<JobQueue>,
    executor: Arc<UnitExecutor>,
    poll_interval: tokio::time::Duration,
) {
    let mut shutdown_rx = queue.shutdown_receiver();
    info!(worker_id, "generation worker started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!(worker_id, "generation worker shutting down");
                    break;
                }
            }
            _ = tokio::time::sleep(poll_interval) => {
                while let Some(unit_id) = queue.claim() {
                    if let Err(e) = executor.execute(&unit_id).await {
                        // Database errors only; the unit row may be stale
                        // but the queue entry is spent either way.
                        error!(worker_id, unit_id = %unit_id, error = %e, "unit execution errored");
                        queue.ack(&unit_id);
                    }
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

//! In-process job queue for deferred work units.
//!
//! The queue only schedules; the database row is the authoritative state.
//! A unit id sits in the deque while its row says `queued` (or
//! `awaiting_import` after approval), and workers claim ids to execute.
//! Per-unit mutual exclusion is a lock keyed by the unit's task id, so a
//! manual redo racing the worker pool skips instead of double-processing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use crate::core::error::{GenError, Result};

pub struct JobQueue {
    /// Unit ids awaiting a worker, FIFO.
    pending: Mutex<VecDeque<String>>,
    /// Execution locks keyed by task id.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Units deferred by the retry backoff: not claimable before this time.
    not_before: Mutex<HashMap<String, DateTime<Utc>>>,
    max_size: usize,
    shutdown_tx: watch::Sender<bool>,
}

impl JobQueue {
    pub fn new(max_size: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            pending: Mutex::new(VecDeque::new()),
            locks: Mutex::new(HashMap::new()),
            not_before: Mutex::new(HashMap::new()),
            max_size,
            shutdown_tx,
        }
    }

    /// Submit a unit for execution. Fails when the queue is full; the
    /// scheduler marks the corresponding row failed so no row is left
    /// orphaned without a task.
    pub fn enqueue(&self, unit_id: &str) -> Result<()> {
        let mut pending = self.pending.lock().expect("queue mutex poisoned");
        if pending.len() >= self.max_size {
            return Err(GenError::Config("work queue is full".to_string()));
        }
        pending.push_back(unit_id.to_string());
        Ok(())
    }

    /// Claim the next eligible unit, skipping entries still inside their
    /// retry backoff window.
    pub fn claim(&self) -> Option<String> {
        let mut pending = self.pending.lock().expect("queue mutex poisoned");
        let not_before = self.not_before.lock().expect("queue mutex poisoned");
        let now = Utc::now();

        for _ in 0..pending.len() {
            let id = pending.pop_front()?;
            match not_before.get(&id) {
                Some(at) if *at > now => pending.push_back(id),
                _ => return Some(id),
            }
        }
        None
    }

    /// Re-submit a failed unit after `backoff`. Bypasses the capacity
    /// check: the unit already holds a queue slot conceptually.
    pub fn retry(&self, unit_id: &str, backoff: Duration) {
        self.not_before
            .lock()
            .expect("queue mutex poisoned")
            .insert(unit_id.to_string(), Utc::now() + backoff);
        self.pending
            .lock()
            .expect("queue mutex poisoned")
            .push_back(unit_id.to_string());
    }

    /// Drop a unit's pending entry (cancellation).
    pub fn remove(&self, unit_id: &str) {
        self.pending
            .lock()
            .expect("queue mutex poisoned")
            .retain(|id| id != unit_id);
        self.ack(unit_id);
    }

    /// Clear per-unit bookkeeping once a unit reached a resting state.
    pub fn ack(&self, unit_id: &str) {
        self.not_before
            .lock()
            .expect("queue mutex poisoned")
            .remove(unit_id);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The execution lock for a task id, created on first use.
    pub fn lock_for(&self, task_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .expect("queue mutex poisoned")
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop a task's execution lock once its holder is done with it. The
    /// entry stays if any other clone is still alive, so a contender that
    /// grabbed the Arc between the unlock and this call keeps a valid lock.
    pub fn release(&self, task_id: &str) {
        let mut locks = self.locks.lock().expect("queue mutex poisoned");
        if let Some(lock) = locks.get(task_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(task_id);
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_claim_fifo() {
        let queue = JobQueue::new(10);
        queue.enqueue("u1").unwrap();
        queue.enqueue("u2").unwrap();

        assert_eq!(queue.claim().as_deref(), Some("u1"));
        assert_eq!(queue.claim().as_deref(), Some("u2"));
        assert_eq!(queue.claim(), None);
    }

    #[test]
    fn test_queue_full() {
        let queue = JobQueue::new(1);
        queue.enqueue("u1").unwrap();
        assert!(queue.enqueue("u2").is_err());
    }

    #[test]
    fn test_backoff_defers_claim() {
        let queue = JobQueue::new(10);
        queue.retry("u1", Duration::hours(1));
        assert_eq!(queue.claim(), None);
        assert_eq!(queue.len(), 1, "deferred unit stays queued");

        // an elapsed backoff makes it claimable
        let queue = JobQueue::new(10);
        queue.retry("u2", Duration::seconds(-1));
        assert_eq!(queue.claim().as_deref(), Some("u2"));
    }

    #[test]
    fn test_remove_drops_pending_entry() {
        let queue = JobQueue::new(10);
        queue.enqueue("u1").unwrap();
        queue.enqueue("u2").unwrap();
        queue.remove("u1");
        assert_eq!(queue.claim().as_deref(), Some("u2"));
        assert_eq!(queue.claim(), None);
    }

    #[test]
    fn test_lock_for_is_stable_per_task() {
        let queue = JobQueue::new(10);
        let a = queue.lock_for("t1");
        let b = queue.lock_for("t1");
        assert!(Arc::ptr_eq(&a, &b));

        let _guard = a.try_lock().unwrap();
        assert!(b.try_lock().is_err(), "second claimant must be refused");
    }

    #[test]
    fn test_release_prunes_unused_locks() {
        let queue = JobQueue::new(10);
        let lock = queue.lock_for("t1");
        let weak = Arc::downgrade(&lock);

        // Still referenced outside the map, release must keep it.
        queue.release("t1");
        assert!(Arc::ptr_eq(&lock, &queue.lock_for("t1")));

        drop(lock);
        queue.release("t1");
        assert!(weak.upgrade().is_none(), "lock entry must be freed");
    }
}

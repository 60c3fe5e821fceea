//! Teacher-facing operations on the work-unit log: review decisions,
//! cancellation, redo and cleanup.
//!
//! Each mutation takes the unit's execution lock first so it cannot
//! interleave with a worker mid-pipeline; the guarded status updates then
//! decide who won if the lock was acquired between two worker phases.

use std::sync::Arc;

use tracing::info;

use crate::core::error::{GenError, Result};
use crate::core::generation::queue::JobQueue;
use crate::core::generation::types::UnitStatus;
use crate::database::models::WorkUnitRecord;
use crate::database::{Database, QuestionOps, WorkUnitOps};

pub struct GenerationLog {
    db: Database,
    queue: Arc<JobQueue>,
}

impl GenerationLog {
    pub fn new(db: Database, queue: Arc<JobQueue>) -> Self {
        Self { db, queue }
    }

    /// All units for an activity, oldest first.
    pub async fn list(&self, activity_id: &str) -> Result<Vec<WorkUnitRecord>> {
        Ok(self.db.list_work_units(activity_id).await?)
    }

    pub async fn get(&self, unit_id: &str) -> Result<Option<WorkUnitRecord>> {
        Ok(self.db.get_work_unit(unit_id).await?)
    }

    /// Accept reviewed results: the unit moves to `awaiting_import` and
    /// goes back on the queue for the import half of the pipeline.
    pub async fn approve(&self, unit_id: &str) -> Result<()> {
        let unit = self.require(unit_id).await?;
        let lock = self.queue.lock_for(&unit.task_id);
        let result = {
            let _guard = lock.lock().await;
            self.approve_locked(unit_id).await
        };
        drop(lock);
        self.queue.release(&unit.task_id);
        result
    }

    async fn approve_locked(&self, unit_id: &str) -> Result<()> {
        if !self
            .db
            .transition_unit(
                unit_id,
                UnitStatus::AwaitingReview.as_str(),
                UnitStatus::AwaitingImport.as_str(),
            )
            .await?
        {
            return Err(GenError::Config(format!(
                "unit {unit_id} is not awaiting review"
            )));
        }
        self.queue.enqueue(unit_id)?;
        info!(unit_id, "results approved for import");
        Ok(())
    }

    /// Discard reviewed results. The stored output stays on the row for
    /// audit; the unit ends up failed and can be redone.
    pub async fn reject(&self, unit_id: &str, reason: Option<&str>) -> Result<()> {
        let unit = self.require(unit_id).await?;
        let lock = self.queue.lock_for(&unit.task_id);
        let result = {
            let _guard = lock.lock().await;
            self.reject_locked(&unit, reason).await
        };
        drop(lock);
        self.queue.release(&unit.task_id);
        result
    }

    async fn reject_locked(&self, unit: &WorkUnitRecord, reason: Option<&str>) -> Result<()> {
        let unit_id = unit.id.as_str();
        if unit.status() != Some(UnitStatus::AwaitingReview) {
            return Err(GenError::Config(format!(
                "unit {unit_id} is not awaiting review"
            )));
        }
        let message = match reason {
            Some(reason) => format!("rejected: {reason}"),
            None => "rejected by reviewer".to_string(),
        };
        self.db.fail_unit(unit_id, &message).await?;
        info!(unit_id, "results rejected");
        Ok(())
    }

    /// Stop a unit wherever it is. A worker currently holding the unit
    /// finishes its in-flight call but its next status write loses the
    /// guard and the output is discarded.
    pub async fn cancel(&self, unit_id: &str) -> Result<()> {
        let unit = self.require(unit_id).await?;
        if !self.db.cancel_unit(unit_id).await? {
            return Err(GenError::Config(format!(
                "unit {unit_id} is already finished"
            )));
        }
        self.queue.remove(unit_id);
        info!(unit_id, from = %unit.status, "unit cancelled");
        Ok(())
    }

    /// Re-run a failed or cancelled unit from scratch: imported questions
    /// (from a partial earlier run) are removed, tries reset, and the unit
    /// requeued.
    pub async fn redo(&self, unit_id: &str) -> Result<()> {
        let unit = self.require(unit_id).await?;
        let lock = self.queue.lock_for(&unit.task_id);
        let result = {
            let _guard = lock.lock().await;
            self.redo_locked(&unit).await
        };
        drop(lock);
        self.queue.release(&unit.task_id);
        result
    }

    async fn redo_locked(&self, unit: &WorkUnitRecord) -> Result<()> {
        let unit_id = unit.id.as_str();
        match unit.status() {
            Some(UnitStatus::Failed) | Some(UnitStatus::Cancelled) => {}
            _ => {
                return Err(GenError::Config(format!(
                    "unit {unit_id} can only be redone after failure or cancellation"
                )))
            }
        }

        self.db.delete_questions_for_unit(unit_id).await?;
        if !self.db.reset_unit(unit_id).await? {
            return Err(GenError::Config(format!("unit {unit_id} could not be reset")));
        }
        self.queue.enqueue(unit_id)?;
        info!(unit_id, "unit requeued for redo");
        Ok(())
    }

    /// Remove a finished unit's log row. Imported questions stay in their
    /// category; only the audit row goes away.
    pub async fn delete(&self, unit_id: &str) -> Result<()> {
        let unit = self.require(unit_id).await?;
        let lock = self.queue.lock_for(&unit.task_id);
        let result = {
            let _guard = lock.lock().await;
            self.delete_locked(&unit).await
        };
        drop(lock);
        self.queue.release(&unit.task_id);
        result
    }

    async fn delete_locked(&self, unit: &WorkUnitRecord) -> Result<()> {
        let unit_id = unit.id.as_str();
        match unit.status() {
            Some(status) if status.is_terminal() => {}
            _ => {
                return Err(GenError::Config(format!(
                    "unit {unit_id} is still active, cancel it first"
                )))
            }
        }
        self.queue.remove(unit_id);
        self.db.delete_work_unit(unit_id).await?;
        info!(unit_id, "unit deleted");
        Ok(())
    }

    async fn require(&self, unit_id: &str) -> Result<WorkUnitRecord> {
        self.db
            .get_work_unit(unit_id)
            .await?
            .ok_or_else(|| GenError::Config(format!("unit {unit_id} does not exist")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::now_rfc3339;

    fn unit(id: &str, status: &str) -> WorkUnitRecord {
        WorkUnitRecord {
            id: id.into(),
            activity_id: "act1".into(),
            user_id: "teacher".into(),
            word_id: "w1".into(),
            question_type: "multichoice".into(),
            level: "A2".into(),
            count: 1,
            prompt_id: "p1".into(),
            format_id: "f1".into(),
            parent_category_id: "cat1".into(),
            subcat_policy: 0,
            subcat_name: None,
            review: 1,
            status: status.into(),
            tries: 0,
            maxtries: 3,
            error: None,
            prompt_text: None,
            results: Some("Q {TRUE}".into()),
            pinned_voice: None,
            task_id: format!("task-{id}"),
            created_at: now_rfc3339(),
            modified_at: now_rfc3339(),
        }
    }

    async fn fixture(status: &str) -> (GenerationLog, Database, Arc<JobQueue>) {
        let db = Database::open_in_memory().await.unwrap();
        db.create_work_unit(&unit("u1", status)).await.unwrap();
        let queue = Arc::new(JobQueue::new(16));
        (GenerationLog::new(db.clone(), queue.clone()), db, queue)
    }

    #[tokio::test]
    async fn test_approve_moves_to_awaiting_import_and_enqueues() {
        let (log, db, queue) = fixture("awaiting_review").await;
        log.approve("u1").await.unwrap();
        let row = db.get_work_unit("u1").await.unwrap().unwrap();
        assert_eq!(row.status, "awaiting_import");
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_approve_refused_outside_review() {
        let (log, _db, _queue) = fixture("queued").await;
        assert!(matches!(log.approve("u1").await, Err(GenError::Config(_))));
    }

    #[tokio::test]
    async fn test_approve_releases_task_lock() {
        let (log, _db, queue) = fixture("awaiting_review").await;
        let weak = Arc::downgrade(&queue.lock_for("task-u1"));
        log.approve("u1").await.unwrap();
        assert!(weak.upgrade().is_none(), "task lock entry must be pruned");
    }

    #[tokio::test]
    async fn test_reject_fails_unit_and_keeps_results() {
        let (log, db, _queue) = fixture("awaiting_review").await;
        log.reject("u1", Some("too easy")).await.unwrap();
        let row = db.get_work_unit("u1").await.unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.error.as_deref(), Some("rejected: too easy"));
        assert!(row.results.is_some());
    }

    #[tokio::test]
    async fn test_cancel_then_redo_resets_tries() {
        let (log, db, _queue) = fixture("fetching_results").await;
        log.cancel("u1").await.unwrap();
        assert_eq!(db.get_work_unit("u1").await.unwrap().unwrap().status, "cancelled");

        log.redo("u1").await.unwrap();
        let row = db.get_work_unit("u1").await.unwrap().unwrap();
        assert_eq!(row.status, "queued");
        assert_eq!(row.tries, 0);
        assert!(row.error.is_none());
    }

    #[tokio::test]
    async fn test_redo_refused_for_running_unit() {
        let (log, _db, _queue) = fixture("fetching_results").await;
        assert!(matches!(log.redo("u1").await, Err(GenError::Config(_))));
    }

    #[tokio::test]
    async fn test_delete_only_terminal() {
        let (log, db, _queue) = fixture("queued").await;
        assert!(log.delete("u1").await.is_err());

        db.cancel_unit("u1").await.unwrap();
        log.delete("u1").await.unwrap();
        assert!(db.get_work_unit("u1").await.unwrap().is_none());
    }
}

//! Work-unit log operations.
//!
//! Status changes are guarded UPDATEs: the WHERE clause names the expected
//! current status, so a write that lost a race (cancellation, a competing
//! redo) affects zero rows and the caller backs off. Terminal rows can only
//! be left via the explicit reset paths.

use super::models::{now_rfc3339, WorkUnitRecord};
use super::Database;
use crate::core::generation::types::UnitStatus;

/// Extension trait for work-unit log operations
pub trait WorkUnitOps {
    fn create_work_unit(&self, unit: &WorkUnitRecord) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_work_unit(&self, id: &str) -> impl std::future::Future<Output = Result<Option<WorkUnitRecord>, sqlx::Error>> + Send;
    fn list_work_units(&self, activity_id: &str) -> impl std::future::Future<Output = Result<Vec<WorkUnitRecord>, sqlx::Error>> + Send;
    fn list_units_with_status(&self, status: &str) -> impl std::future::Future<Output = Result<Vec<WorkUnitRecord>, sqlx::Error>> + Send;
    fn delete_work_unit(&self, id: &str) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;

    /// Move a unit from `from` to `to`. Returns false if the row was not in
    /// `from` anymore (lost race or cancelled).
    fn transition_unit(&self, id: &str, from: &str, to: &str) -> impl std::future::Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Terminal failure with the error text recorded verbatim. No-op on
    /// rows already terminal.
    fn fail_unit(&self, id: &str, error: &str) -> impl std::future::Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Retry reset: increment tries and go back to queued. Returns false
    /// when the attempt budget is spent; the caller fails the unit instead.
    fn requeue_unit(&self, id: &str, error: &str) -> impl std::future::Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Redo reset: tries back to zero, error cleared, status queued.
    /// Refused for completed rows.
    fn reset_unit(&self, id: &str) -> impl std::future::Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Cancel a non-terminal unit, keeping the row for audit.
    fn cancel_unit(&self, id: &str) -> impl std::future::Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Record the composed prompt, only while the row is still in
    /// `expected_status`. Returns false when the row moved (cancelled).
    fn set_unit_prompt(&self, id: &str, expected_status: &str, prompt_text: &str) -> impl std::future::Future<Output = Result<bool, sqlx::Error>> + Send;
    /// Record raw backend output under the same status guard.
    fn set_unit_results(&self, id: &str, expected_status: &str, results: &str) -> impl std::future::Future<Output = Result<bool, sqlx::Error>> + Send;
    fn set_pinned_voice(&self, id: &str, voice: &str) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
}

const TERMINAL: &str = "('completed', 'cancelled', 'failed')";

impl WorkUnitOps for Database {
    async fn create_work_unit(&self, unit: &WorkUnitRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO work_units (id, activity_id, user_id, word_id, question_type, level,
                count, prompt_id, format_id, parent_category_id, subcat_policy, subcat_name,
                review, status, tries, maxtries, error, prompt_text, results, pinned_voice,
                task_id, created_at, modified_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&unit.id)
        .bind(&unit.activity_id)
        .bind(&unit.user_id)
        .bind(&unit.word_id)
        .bind(&unit.question_type)
        .bind(&unit.level)
        .bind(unit.count)
        .bind(&unit.prompt_id)
        .bind(&unit.format_id)
        .bind(&unit.parent_category_id)
        .bind(unit.subcat_policy)
        .bind(&unit.subcat_name)
        .bind(unit.review)
        .bind(&unit.status)
        .bind(unit.tries)
        .bind(unit.maxtries)
        .bind(&unit.error)
        .bind(&unit.prompt_text)
        .bind(&unit.results)
        .bind(&unit.pinned_voice)
        .bind(&unit.task_id)
        .bind(&unit.created_at)
        .bind(&unit.modified_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_work_unit(&self, id: &str) -> Result<Option<WorkUnitRecord>, sqlx::Error> {
        sqlx::query_as::<_, WorkUnitRecord>("SELECT * FROM work_units WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
    }

    async fn list_work_units(&self, activity_id: &str) -> Result<Vec<WorkUnitRecord>, sqlx::Error> {
        sqlx::query_as::<_, WorkUnitRecord>(
            "SELECT * FROM work_units WHERE activity_id = ? ORDER BY created_at",
        )
        .bind(activity_id)
        .fetch_all(self.pool())
        .await
    }

    async fn list_units_with_status(&self, status: &str) -> Result<Vec<WorkUnitRecord>, sqlx::Error> {
        sqlx::query_as::<_, WorkUnitRecord>(
            "SELECT * FROM work_units WHERE status = ? ORDER BY created_at",
        )
        .bind(status)
        .fetch_all(self.pool())
        .await
    }

    async fn delete_work_unit(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM work_units WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn transition_unit(&self, id: &str, from: &str, to: &str) -> Result<bool, sqlx::Error> {
        debug_assert!(
            matches!(
                (UnitStatus::parse(from), UnitStatus::parse(to)),
                (Some(f), Some(t)) if f.can_transition_to(t)
            ),
            "illegal work unit transition {from} -> {to}"
        );
        let result = sqlx::query(
            "UPDATE work_units SET status = ?, modified_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to)
        .bind(now_rfc3339())
        .bind(id)
        .bind(from)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail_unit(&self, id: &str, error: &str) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "UPDATE work_units SET status = 'failed', tries = tries + 1, error = ?, \
             modified_at = ? WHERE id = ? AND status NOT IN {TERMINAL}"
        );
        let result = sqlx::query(&sql)
            .bind(error)
            .bind(now_rfc3339())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn requeue_unit(&self, id: &str, error: &str) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "UPDATE work_units SET status = 'queued', tries = tries + 1, error = ?, \
             modified_at = ? WHERE id = ? AND status NOT IN {TERMINAL} AND tries + 1 < maxtries"
        );
        let result = sqlx::query(&sql)
            .bind(error)
            .bind(now_rfc3339())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset_unit(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE work_units SET status = 'queued', tries = 0, error = NULL, \
             results = NULL, modified_at = ? WHERE id = ? AND status != 'completed'",
        )
        .bind(now_rfc3339())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel_unit(&self, id: &str) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "UPDATE work_units SET status = 'cancelled', modified_at = ? \
             WHERE id = ? AND status NOT IN {TERMINAL}"
        );
        let result = sqlx::query(&sql)
            .bind(now_rfc3339())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_unit_prompt(
        &self,
        id: &str,
        expected_status: &str,
        prompt_text: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE work_units SET prompt_text = ?, modified_at = ? WHERE id = ? AND status = ?",
        )
        .bind(prompt_text)
        .bind(now_rfc3339())
        .bind(id)
        .bind(expected_status)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_unit_results(
        &self,
        id: &str,
        expected_status: &str,
        results: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE work_units SET results = ?, modified_at = ? WHERE id = ? AND status = ?",
        )
        .bind(results)
        .bind(now_rfc3339())
        .bind(id)
        .bind(expected_status)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_pinned_voice(&self, id: &str, voice: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE work_units SET pinned_voice = ?, modified_at = ? WHERE id = ?")
            .bind(voice)
            .bind(now_rfc3339())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

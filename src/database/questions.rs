//! Imported-question database operations.
//!
//! Insertion happens inside the importer's transaction; this trait covers
//! the read side plus the per-unit counts the tests and log surface use.

use super::models::QuestionRecord;
use super::Database;
use sqlx::Row;

/// Extension trait for question operations
pub trait QuestionOps {
    fn list_questions_in_category(&self, category_id: &str) -> impl std::future::Future<Output = Result<Vec<QuestionRecord>, sqlx::Error>> + Send;
    fn list_questions_for_unit(&self, unit_id: &str) -> impl std::future::Future<Output = Result<Vec<QuestionRecord>, sqlx::Error>> + Send;
    fn count_questions_for_unit(&self, unit_id: &str) -> impl std::future::Future<Output = Result<i64, sqlx::Error>> + Send;
    fn delete_questions_for_unit(&self, unit_id: &str) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
}

impl QuestionOps for Database {
    async fn list_questions_in_category(&self, category_id: &str) -> Result<Vec<QuestionRecord>, sqlx::Error> {
        sqlx::query_as::<_, QuestionRecord>(
            "SELECT * FROM questions WHERE category_id = ? ORDER BY created_at",
        )
        .bind(category_id)
        .fetch_all(self.pool())
        .await
    }

    async fn list_questions_for_unit(&self, unit_id: &str) -> Result<Vec<QuestionRecord>, sqlx::Error> {
        sqlx::query_as::<_, QuestionRecord>(
            "SELECT * FROM questions WHERE unit_id = ? ORDER BY created_at",
        )
        .bind(unit_id)
        .fetch_all(self.pool())
        .await
    }

    async fn count_questions_for_unit(&self, unit_id: &str) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM questions WHERE unit_id = ?")
            .bind(unit_id)
            .fetch_one(self.pool())
            .await?;
        row.try_get("n")
    }

    async fn delete_questions_for_unit(&self, unit_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM questions WHERE unit_id = ?")
            .bind(unit_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

//! Activity and word database operations.

use super::models::{ActivityRecord, WordRecord};
use super::Database;

/// Extension trait for activity/word operations
pub trait VocabOps {
    fn create_activity(&self, activity: &ActivityRecord) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_activity(&self, id: &str) -> impl std::future::Future<Output = Result<Option<ActivityRecord>, sqlx::Error>> + Send;

    fn create_word(&self, word: &WordRecord) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_word(&self, id: &str) -> impl std::future::Future<Output = Result<Option<WordRecord>, sqlx::Error>> + Send;
    fn list_words(&self, activity_id: &str) -> impl std::future::Future<Output = Result<Vec<WordRecord>, sqlx::Error>> + Send;
}

impl VocabOps for Database {
    async fn create_activity(&self, activity: &ActivityRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO activities (id, name, course_id, course_name, section_name,
                course_category_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&activity.id)
        .bind(&activity.name)
        .bind(&activity.course_id)
        .bind(&activity.course_name)
        .bind(&activity.section_name)
        .bind(&activity.course_category_id)
        .bind(&activity.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_activity(&self, id: &str) -> Result<Option<ActivityRecord>, sqlx::Error> {
        sqlx::query_as::<_, ActivityRecord>("SELECT * FROM activities WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
    }

    async fn create_word(&self, word: &WordRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO words (id, activity_id, headword, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&word.id)
        .bind(&word.activity_id)
        .bind(&word.headword)
        .bind(&word.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_word(&self, id: &str) -> Result<Option<WordRecord>, sqlx::Error> {
        sqlx::query_as::<_, WordRecord>("SELECT * FROM words WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
    }

    async fn list_words(&self, activity_id: &str) -> Result<Vec<WordRecord>, sqlx::Error> {
        sqlx::query_as::<_, WordRecord>(
            "SELECT * FROM words WHERE activity_id = ? ORDER BY headword",
        )
        .bind(activity_id)
        .fetch_all(self.pool())
        .await
    }
}

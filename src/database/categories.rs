//! Question-category tree operations.
//!
//! `find_or_create_child` is the storage half of the category resolver: an
//! insert-or-get on the unique `(parent_id, name)` pair, so resolving the
//! same path twice always lands on the same row.

use uuid::Uuid;

use super::models::{now_rfc3339, CategoryRecord};
use super::Database;

/// Extension trait for category operations
pub trait CategoryOps {
    fn create_root_category(&self, name: &str) -> impl std::future::Future<Output = Result<CategoryRecord, sqlx::Error>> + Send;
    fn get_category(&self, id: &str) -> impl std::future::Future<Output = Result<Option<CategoryRecord>, sqlx::Error>> + Send;
    fn find_or_create_child(&self, parent_id: &str, name: &str) -> impl std::future::Future<Output = Result<CategoryRecord, sqlx::Error>> + Send;
    fn list_children(&self, parent_id: &str) -> impl std::future::Future<Output = Result<Vec<CategoryRecord>, sqlx::Error>> + Send;
}

impl CategoryOps for Database {
    async fn create_root_category(&self, name: &str) -> Result<CategoryRecord, sqlx::Error> {
        self.find_or_create_child("", name).await
    }

    async fn get_category(&self, id: &str) -> Result<Option<CategoryRecord>, sqlx::Error> {
        sqlx::query_as::<_, CategoryRecord>("SELECT * FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
    }

    async fn find_or_create_child(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<CategoryRecord, sqlx::Error> {
        // Atomic insert-or-get; losing the insert race is fine because the
        // follow-up select sees the winner's row.
        sqlx::query(
            r#"
            INSERT INTO categories (id, parent_id, name, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (parent_id, name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(parent_id)
        .bind(name)
        .bind(now_rfc3339())
        .execute(self.pool())
        .await?;

        sqlx::query_as::<_, CategoryRecord>(
            "SELECT * FROM categories WHERE parent_id = ? AND name = ?",
        )
        .bind(parent_id)
        .bind(name)
        .fetch_one(self.pool())
        .await
    }

    async fn list_children(&self, parent_id: &str) -> Result<Vec<CategoryRecord>, sqlx::Error> {
        sqlx::query_as::<_, CategoryRecord>(
            "SELECT * FROM categories WHERE parent_id = ? ORDER BY name",
        )
        .bind(parent_id)
        .fetch_all(self.pool())
        .await
    }
}

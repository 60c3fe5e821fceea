//! Assistant-config database operations.

use super::models::AssistantConfigRecord;
use super::Database;

/// Extension trait for assistant-config operations
pub trait AssistantOps {
    fn create_assistant_config(&self, config: &AssistantConfigRecord) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_assistant_config(&self, id: &str) -> impl std::future::Future<Output = Result<Option<AssistantConfigRecord>, sqlx::Error>> + Send;
    /// All configs for a capability, newest first. Visibility filtering
    /// happens in the registry, not here.
    fn list_configs_for_capability(&self, capability: &str) -> impl std::future::Future<Output = Result<Vec<AssistantConfigRecord>, sqlx::Error>> + Send;
    fn delete_assistant_config(&self, id: &str) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
}

impl AssistantOps for Database {
    async fn create_assistant_config(&self, config: &AssistantConfigRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO assistant_configs (id, owner_id, capability, endpoint, api_key, model,
                params, context_level, context_id, shared_from, shared_until,
                created_at, modified_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&config.id)
        .bind(&config.owner_id)
        .bind(&config.capability)
        .bind(&config.endpoint)
        .bind(&config.api_key)
        .bind(&config.model)
        .bind(&config.params)
        .bind(&config.context_level)
        .bind(&config.context_id)
        .bind(&config.shared_from)
        .bind(&config.shared_until)
        .bind(&config.created_at)
        .bind(&config.modified_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_assistant_config(&self, id: &str) -> Result<Option<AssistantConfigRecord>, sqlx::Error> {
        sqlx::query_as::<_, AssistantConfigRecord>("SELECT * FROM assistant_configs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
    }

    async fn list_configs_for_capability(&self, capability: &str) -> Result<Vec<AssistantConfigRecord>, sqlx::Error> {
        sqlx::query_as::<_, AssistantConfigRecord>(
            "SELECT * FROM assistant_configs WHERE capability = ? ORDER BY modified_at DESC",
        )
        .bind(capability)
        .fetch_all(self.pool())
        .await
    }

    async fn delete_assistant_config(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM assistant_configs WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

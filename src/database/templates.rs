//! Prompt and format template database operations.

use super::models::{FormatTemplateRecord, PromptTemplateRecord};
use super::Database;

/// Extension trait for template operations
pub trait TemplateOps {
    fn create_prompt_template(&self, template: &PromptTemplateRecord) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_prompt_template(&self, id: &str) -> impl std::future::Future<Output = Result<Option<PromptTemplateRecord>, sqlx::Error>> + Send;
    fn list_prompt_templates(&self, owner_id: &str) -> impl std::future::Future<Output = Result<Vec<PromptTemplateRecord>, sqlx::Error>> + Send;

    fn create_format_template(&self, template: &FormatTemplateRecord) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_format_template(&self, id: &str) -> impl std::future::Future<Output = Result<Option<FormatTemplateRecord>, sqlx::Error>> + Send;
}

impl TemplateOps for Database {
    async fn create_prompt_template(&self, template: &PromptTemplateRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO prompt_templates (id, owner_id, name, body, defaults, context_level,
                context_id, shared_from, shared_until, created_at, modified_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&template.id)
        .bind(&template.owner_id)
        .bind(&template.name)
        .bind(&template.body)
        .bind(&template.defaults)
        .bind(&template.context_level)
        .bind(&template.context_id)
        .bind(&template.shared_from)
        .bind(&template.shared_until)
        .bind(&template.created_at)
        .bind(&template.modified_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_prompt_template(&self, id: &str) -> Result<Option<PromptTemplateRecord>, sqlx::Error> {
        sqlx::query_as::<_, PromptTemplateRecord>("SELECT * FROM prompt_templates WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
    }

    async fn list_prompt_templates(&self, owner_id: &str) -> Result<Vec<PromptTemplateRecord>, sqlx::Error> {
        sqlx::query_as::<_, PromptTemplateRecord>(
            "SELECT * FROM prompt_templates WHERE owner_id = ? ORDER BY name",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await
    }

    async fn create_format_template(&self, template: &FormatTemplateRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO format_templates (id, owner_id, name, body, context_level,
                context_id, shared_from, shared_until, created_at, modified_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&template.id)
        .bind(&template.owner_id)
        .bind(&template.name)
        .bind(&template.body)
        .bind(&template.context_level)
        .bind(&template.context_id)
        .bind(&template.shared_from)
        .bind(&template.shared_until)
        .bind(&template.created_at)
        .bind(&template.modified_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_format_template(&self, id: &str) -> Result<Option<FormatTemplateRecord>, sqlx::Error> {
        sqlx::query_as::<_, FormatTemplateRecord>("SELECT * FROM format_templates WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
    }
}

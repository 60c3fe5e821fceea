//! SQLite persistence layer.
//!
//! `Database` wraps the connection pool; table groups get extension traits
//! (`WorkUnitOps`, `AssistantOps`, ...) implemented on it.

pub mod assistants;
pub mod categories;
pub mod migrations;
pub mod models;
pub mod questions;
pub mod templates;
pub mod vocab;
pub mod workunits;

pub use assistants::AssistantOps;
pub use categories::CategoryOps;
pub use questions::QuestionOps;
pub use templates::TemplateOps;
pub use vocab::VocabOps;
pub use workunits::WorkUnitOps;

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

/// Shared handle to the SQLite pool. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;
        info!(path = %path.display(), "Database opened");

        Ok(Self { pool })
    }

    /// In-memory database for tests. Pinned to one connection so every
    /// query sees the same store.
    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{now_rfc3339, WordRecord};
    use crate::database::vocab::VocabOps;

    #[tokio::test]
    async fn test_reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocabforge.db");

        {
            let db = Database::open(&path).await.unwrap();
            db.create_word(&WordRecord {
                id: "w1".into(),
                activity_id: "act1".into(),
                headword: "apple".into(),
                created_at: now_rfc3339(),
            })
            .await
            .unwrap();
        }

        // Second open re-runs migrations as a no-op and sees the same data.
        let db = Database::open(&path).await.unwrap();
        let word = db.get_word("w1").await.unwrap().unwrap();
        assert_eq!(word.headword, "apple");
    }
}

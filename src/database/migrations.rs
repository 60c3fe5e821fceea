//! Database Migrations
//!
//! Handles schema creation and versioned migrations.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{info, warn};

/// Current database schema version
const SCHEMA_VERSION: i32 = 3;

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version = get_current_version(pool).await?;

    if current_version < SCHEMA_VERSION {
        info!(
            "Running database migrations from v{} to v{}",
            current_version, SCHEMA_VERSION
        );

        for version in (current_version + 1)..=SCHEMA_VERSION {
            run_migration(pool, version).await?;
        }

        info!("Database migrations completed successfully");
    }

    Ok(())
}

/// Get the current schema version
async fn get_current_version(pool: &SqlitePool) -> Result<i32, sqlx::Error> {
    let result = sqlx::query("SELECT MAX(version) as version FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(result
        .and_then(|row| row.try_get::<i32, _>("version").ok())
        .unwrap_or(0))
}

/// Run a specific migration version
async fn run_migration(pool: &SqlitePool, version: i32) -> Result<(), sqlx::Error> {
    let (name, sql) = match version {
        1 => ("initial_schema", MIGRATION_V1),
        2 => ("work_unit_indexes", MIGRATION_V2),
        3 => ("question_media", MIGRATION_V3),
        _ => {
            warn!("Unknown migration version: {}", version);
            return Ok(());
        }
    };

    info!("Applying migration v{}: {}", version, name);

    for statement in statements(sql) {
        sqlx::query(&statement).execute(pool).await?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(version)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Split migration SQL into executable statements. Comment lines are
/// dropped first so punctuation in a comment cannot break a statement.
fn statements(sql: &str) -> Vec<String> {
    let stripped: String = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    stripped
        .split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Migration v1: Initial schema
const MIGRATION_V1: &str = r#"
-- Activities (course context for category naming and sharing scopes)
CREATE TABLE IF NOT EXISTS activities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    course_id TEXT NOT NULL,
    course_name TEXT NOT NULL,
    section_name TEXT NOT NULL,
    course_category_id TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Vocabulary words
CREATE TABLE IF NOT EXISTS words (
    id TEXT PRIMARY KEY,
    activity_id TEXT NOT NULL,
    headword TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Assistant configurations, one per capability per owner/context
CREATE TABLE IF NOT EXISTS assistant_configs (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    capability TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    api_key TEXT NOT NULL,
    model TEXT NOT NULL,
    params TEXT NOT NULL,
    context_level TEXT NOT NULL,
    context_id TEXT NOT NULL,
    shared_from TEXT,
    shared_until TEXT,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

-- Prompt templates with default AI-settings bindings
CREATE TABLE IF NOT EXISTS prompt_templates (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    body TEXT NOT NULL,
    defaults TEXT NOT NULL,
    context_level TEXT NOT NULL,
    context_id TEXT NOT NULL,
    shared_from TEXT,
    shared_until TEXT,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

-- Output format templates
CREATE TABLE IF NOT EXISTS format_templates (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    body TEXT NOT NULL,
    context_level TEXT NOT NULL,
    context_id TEXT NOT NULL,
    shared_from TEXT,
    shared_until TEXT,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

-- Question categories. Roots use parent_id = ''.
-- The unique pair makes resolution idempotent.
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    parent_id TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (parent_id, name)
);

-- Generation log: one row per (word, question type, level) request
CREATE TABLE IF NOT EXISTS work_units (
    id TEXT PRIMARY KEY,
    activity_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    word_id TEXT NOT NULL,
    question_type TEXT NOT NULL,
    level TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 1,
    prompt_id TEXT NOT NULL,
    format_id TEXT NOT NULL,
    parent_category_id TEXT NOT NULL,
    subcat_policy INTEGER NOT NULL DEFAULT 0,
    subcat_name TEXT,
    review INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    tries INTEGER NOT NULL DEFAULT 0,
    maxtries INTEGER NOT NULL DEFAULT 3,
    error TEXT,
    prompt_text TEXT,
    results TEXT,
    pinned_voice TEXT,
    task_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

-- Imported questions
CREATE TABLE IF NOT EXISTS questions (
    id TEXT PRIMARY KEY,
    unit_id TEXT NOT NULL,
    category_id TEXT NOT NULL,
    name TEXT NOT NULL,
    question_type TEXT NOT NULL,
    question_text TEXT NOT NULL,
    answers TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

/// Migration v2: Indexes for the hot log queries
const MIGRATION_V2: &str = r#"
CREATE INDEX IF NOT EXISTS idx_work_units_activity ON work_units (activity_id);
CREATE INDEX IF NOT EXISTS idx_work_units_status ON work_units (status);
CREATE UNIQUE INDEX IF NOT EXISTS idx_work_units_task ON work_units (task_id);
CREATE INDEX IF NOT EXISTS idx_words_activity ON words (activity_id);
CREATE INDEX IF NOT EXISTS idx_questions_category ON questions (category_id);
CREATE INDEX IF NOT EXISTS idx_questions_unit ON questions (unit_id)
"#;

/// Migration v3: Media reference on imported questions
const MIGRATION_V3: &str = r#"
ALTER TABLE questions ADD COLUMN media TEXT
"#;

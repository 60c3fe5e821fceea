//! Database record types.
//!
//! Records map 1:1 to table rows. Enumerated columns (status, capability,
//! question type, level) are stored as TEXT and parsed on access so that a
//! row with an unknown value surfaces as an error instead of a panic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::generation::types::{QuestionType, UnitStatus, VocabLevel};

/// RFC 3339 timestamp for a freshly created or touched row.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

// ============================================================================
// Activities and Words
// ============================================================================

/// One vocabulary activity instance. Carries the naming context used by the
/// category resolver and the sharing context used by the registry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityRecord {
    pub id: String,
    pub name: String,
    pub course_id: String,
    pub course_name: String,
    pub section_name: String,
    /// Course-category the course lives in (sharing scope, not a question
    /// category).
    pub course_category_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WordRecord {
    pub id: String,
    pub activity_id: String,
    pub headword: String,
    pub created_at: String,
}

impl WordRecord {
    pub fn new(activity_id: &str, headword: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            activity_id: activity_id.to_string(),
            headword: headword.to_string(),
            created_at: now_rfc3339(),
        }
    }
}

// ============================================================================
// Assistant Configs
// ============================================================================

/// Stored credentials and parameters for one AI backend capability.
///
/// `params` is a JSON blob deserialized into the typed per-capability
/// parameter struct at use; `capability` selects which one.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssistantConfigRecord {
    pub id: String,
    pub owner_id: String,
    pub capability: String,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub params: String,
    pub context_level: String,
    pub context_id: String,
    pub shared_from: Option<String>,
    pub shared_until: Option<String>,
    pub created_at: String,
    pub modified_at: String,
}

// ============================================================================
// Templates
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PromptTemplateRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    /// Template body with `{{...}}` placeholders.
    pub body: String,
    /// JSON-encoded default AI-settings bindings merged into new requests.
    pub defaults: String,
    pub context_level: String,
    pub context_id: String,
    pub shared_from: Option<String>,
    pub shared_until: Option<String>,
    pub created_at: String,
    pub modified_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FormatTemplateRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub body: String,
    pub context_level: String,
    pub context_id: String,
    pub shared_from: Option<String>,
    pub shared_until: Option<String>,
    pub created_at: String,
    pub modified_at: String,
}

// ============================================================================
// Categories
// ============================================================================

/// A node in the question-category tree. Roots have `parent_id = ""`;
/// `(parent_id, name)` is unique so resolution is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryRecord {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub created_at: String,
}

// ============================================================================
// Work Units
// ============================================================================

/// Durable log row for one (word, question type, level) generation request.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkUnitRecord {
    pub id: String,
    pub activity_id: String,
    pub user_id: String,
    pub word_id: String,
    pub question_type: String,
    pub level: String,
    /// Requested questions per combination.
    pub count: i64,
    pub prompt_id: String,
    pub format_id: String,
    pub parent_category_id: String,
    /// Bit flags, see `core::category::SubcatPolicy`.
    pub subcat_policy: i64,
    pub subcat_name: Option<String>,
    /// Whether results stall at awaiting_review for teacher approval.
    pub review: i64,
    pub status: String,
    pub tries: i64,
    pub maxtries: i64,
    pub error: Option<String>,
    /// Raw prompt sent to the backend, recorded for audit.
    pub prompt_text: Option<String>,
    /// Raw backend output, recorded before import.
    pub results: Option<String>,
    /// Concrete voice pinned to this unit on first audio call.
    pub pinned_voice: Option<String>,
    /// Backing deferred-task id; keys the per-unit execution lock.
    pub task_id: String,
    pub created_at: String,
    pub modified_at: String,
}

impl WorkUnitRecord {
    pub fn status(&self) -> Option<UnitStatus> {
        UnitStatus::parse(&self.status)
    }

    pub fn question_type(&self) -> Option<QuestionType> {
        QuestionType::parse(&self.question_type)
    }

    pub fn level(&self) -> Option<VocabLevel> {
        VocabLevel::parse(&self.level)
    }

    pub fn review_required(&self) -> bool {
        self.review != 0
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.modified_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

// ============================================================================
// Questions
// ============================================================================

/// One imported question, persisted into a category.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QuestionRecord {
    pub id: String,
    pub unit_id: String,
    pub category_id: String,
    pub name: String,
    pub question_type: String,
    pub question_text: String,
    /// JSON-encoded answer list (text, correctness, feedback, match target).
    pub answers: String,
    /// Reference to generated media (image URL or embedded audio payload).
    pub media: Option<String>,
    pub created_at: String,
}

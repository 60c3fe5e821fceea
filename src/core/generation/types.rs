//! Work-unit status machine and the vocabulary of a generation request.

use serde::{Deserialize, Serialize};

// ============================================================================
// Unit Status
// ============================================================================

/// Lifecycle status of one work unit.
///
/// Forward-only, except for the explicit retry/redo reset to `Queued` and
/// cancellation. `Completed`, `Failed` and `Cancelled` are terminal;
/// `Completed` rows are immutable except for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    NotSet,
    /// Waiting for a worker to claim it.
    Queued,
    /// Validating that the word, templates, category and assistant config
    /// referenced by the unit still exist and are accessible.
    CheckingParams,
    /// Outbound call to the AI backend in progress.
    FetchingResults,
    /// Results fetched; stalled until an explicit approval action.
    AwaitingReview,
    /// Approved (or review not required); waiting for the import phase.
    AwaitingImport,
    ImportingResults,
    Completed,
    Cancelled,
    Failed,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::NotSet => "not_set",
            UnitStatus::Queued => "queued",
            UnitStatus::CheckingParams => "checking_params",
            UnitStatus::FetchingResults => "fetching_results",
            UnitStatus::AwaitingReview => "awaiting_review",
            UnitStatus::AwaitingImport => "awaiting_import",
            UnitStatus::ImportingResults => "importing_results",
            UnitStatus::Completed => "completed",
            UnitStatus::Cancelled => "cancelled",
            UnitStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_set" => Some(UnitStatus::NotSet),
            "queued" => Some(UnitStatus::Queued),
            "checking_params" => Some(UnitStatus::CheckingParams),
            "fetching_results" => Some(UnitStatus::FetchingResults),
            "awaiting_review" => Some(UnitStatus::AwaitingReview),
            "awaiting_import" => Some(UnitStatus::AwaitingImport),
            "importing_results" => Some(UnitStatus::ImportingResults),
            "completed" => Some(UnitStatus::Completed),
            "cancelled" => Some(UnitStatus::Cancelled),
            "failed" => Some(UnitStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitStatus::Completed | UnitStatus::Cancelled | UnitStatus::Failed
        )
    }

    /// Position in the forward sequence; terminal states sort last.
    fn ordinal(&self) -> u8 {
        match self {
            UnitStatus::NotSet => 0,
            UnitStatus::Queued => 1,
            UnitStatus::CheckingParams => 2,
            UnitStatus::FetchingResults => 3,
            UnitStatus::AwaitingReview => 4,
            UnitStatus::AwaitingImport => 5,
            UnitStatus::ImportingResults => 6,
            UnitStatus::Completed => 7,
            UnitStatus::Cancelled => 8,
            UnitStatus::Failed => 8,
        }
    }

    /// Whether the machine may move from `self` to `to`.
    ///
    /// Forward moves are allowed; `Failed` and `Cancelled` are reachable
    /// from any non-terminal state; the only backward edge is the explicit
    /// reset to `Queued` (retry/redo), which is never allowed out of
    /// `Completed`.
    pub fn can_transition_to(&self, to: UnitStatus) -> bool {
        if self.is_terminal() {
            // Redo can resurrect a failed or cancelled unit, never a
            // completed one.
            return to == UnitStatus::Queued && *self != UnitStatus::Completed;
        }
        match to {
            UnitStatus::Failed | UnitStatus::Cancelled => true,
            UnitStatus::Queued => true, // retry reset
            _ => to.ordinal() > self.ordinal(),
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Question Types and Levels
// ============================================================================

/// Kinds of questions the importer knows how to materialize.
///
/// The serde names match `as_str()` so stored template defaults use the
/// same vocabulary as the database columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "multichoice")]
    MultiChoice,
    #[serde(rename = "truefalse")]
    TrueFalse,
    #[serde(rename = "shortanswer")]
    ShortAnswer,
    #[serde(rename = "match")]
    Match,
    #[serde(rename = "gapfill")]
    GapFill,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultiChoice => "multichoice",
            QuestionType::TrueFalse => "truefalse",
            QuestionType::ShortAnswer => "shortanswer",
            QuestionType::Match => "match",
            QuestionType::GapFill => "gapfill",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "multichoice" => Some(QuestionType::MultiChoice),
            "truefalse" => Some(QuestionType::TrueFalse),
            "shortanswer" => Some(QuestionType::ShortAnswer),
            "match" => Some(QuestionType::Match),
            "gapfill" => Some(QuestionType::GapFill),
            _ => None,
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CEFR proficiency band for a generated question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VocabLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl VocabLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VocabLevel::A1 => "A1",
            VocabLevel::A2 => "A2",
            VocabLevel::B1 => "B1",
            VocabLevel::B2 => "B2",
            VocabLevel::C1 => "C1",
            VocabLevel::C2 => "C2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A1" => Some(VocabLevel::A1),
            "A2" => Some(VocabLevel::A2),
            "B1" => Some(VocabLevel::B1),
            "B2" => Some(VocabLevel::B2),
            "C1" => Some(VocabLevel::C1),
            "C2" => Some(VocabLevel::C2),
            _ => None,
        }
    }
}

impl std::fmt::Display for VocabLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

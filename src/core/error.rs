//! Error taxonomy for the generation pipeline.
//!
//! Every failure recorded on a work unit is one of these variants; the
//! executor uses [`GenError::is_retryable`] to decide between re-queueing
//! and terminal failure.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenError {
    /// Missing or invalid assistant URL/key/model, category, word, template,
    /// or permission. Fatal: retrying cannot fix configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend reported an application-level error, or returned a
    /// non-success status. Retryable up to maxtries.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Network-level failure talking to the backend. Retryable.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend response could not be interpreted. Retryable, since
    /// generation backends are not deterministic.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The backend returned nothing usable after parsing. Distinct from a
    /// transport failure; retryable.
    #[error("Empty results")]
    EmptyResults,

    /// Parsed output was structurally invalid for import. Fatal: an
    /// identical prompt is expected to reproduce the same malformed output.
    #[error("Import error: {0}")]
    Import(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl GenError {
    /// Whether a failure of this kind should be re-queued (bounded by the
    /// unit's maxtries) rather than recorded as terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenError::Transport(_)
                | GenError::Network(_)
                | GenError::Parse(_)
                | GenError::EmptyResults
        )
    }
}

pub type Result<T> = std::result::Result<T, GenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GenError::Transport("503".into()).is_retryable());
        assert!(GenError::Parse("bad json".into()).is_retryable());
        assert!(GenError::EmptyResults.is_retryable());

        assert!(!GenError::Config("no api key".into()).is_retryable());
        assert!(!GenError::Import("choice without answers".into()).is_retryable());
    }

    #[test]
    fn test_error_messages_carry_detail() {
        let err = GenError::Config("assistant endpoint not set".into());
        assert!(err.to_string().contains("assistant endpoint not set"));
    }
}

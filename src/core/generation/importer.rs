//! Result importer: GIFT-style parsing and atomic question persistence.
//!
//! Backend output is expected in the GIFT mini-language:
//!
//! ```text
//! ::name:: What colour is a ripe {{word}}? {=red ~blue ~green #It ripens red.}
//! A ripe apple is a vegetable. {FALSE}
//! ::pairs:: Match the words. {=apple -> fruit =carrot -> vegetable}
//! ```
//!
//! Zero parsed questions is `EmptyResults` (retryable); a block that parses
//! but is structurally unusable is an `Import` error (fatal, since the same
//! prompt reproduces the same malformed output).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::{GenError, Result};
use crate::core::generation::types::{QuestionType, UnitStatus};
use crate::database::models::{now_rfc3339, WorkUnitRecord};
use crate::database::Database;

// ============================================================================
// Parsed representation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAnswer {
    pub text: String,
    pub correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Right-hand side for matching questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_target: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuestion {
    pub name: Option<String>,
    pub text: String,
    pub question_type: QuestionType,
    pub answers: Vec<ParsedAnswer>,
    /// Media reference attached after parsing (image URL, audio payload).
    pub media: Option<String>,
}

// ============================================================================
// Parser
// ============================================================================

/// Parse GIFT text into questions. Comment lines (`//`) are dropped;
/// questions are separated by blank lines.
pub fn parse_gift(raw: &str) -> Result<Vec<ParsedQuestion>> {
    let cleaned: Vec<&str> = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect();

    let mut questions = Vec::new();
    for block in cleaned.join("\n").split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        questions.push(parse_block(block)?);
    }

    if questions.is_empty() {
        return Err(GenError::EmptyResults);
    }
    Ok(questions)
}

fn parse_block(block: &str) -> Result<ParsedQuestion> {
    let (name, rest) = parse_name(block);

    let open = rest
        .find('{')
        .ok_or_else(|| GenError::Import(format!("question has no answer braces: {}", excerpt(rest))))?;
    let close = rest
        .rfind('}')
        .filter(|end| *end > open)
        .ok_or_else(|| GenError::Import(format!("question has unclosed braces: {}", excerpt(rest))))?;

    let before = rest[..open].trim();
    let inner = rest[open + 1..close].trim();
    let after = rest[close + 1..].trim();

    // Mid-sentence braces are a gap-fill; the gap is marked in the text.
    let (text, gapfill) = if after.is_empty() {
        (before.to_string(), false)
    } else {
        (format!("{before} _____ {after}"), true)
    };

    if text.is_empty() {
        return Err(GenError::Import("question has no text".to_string()));
    }

    let upper = inner.to_ascii_uppercase();
    if matches!(upper.as_str(), "TRUE" | "T" | "FALSE" | "F") {
        let truth = matches!(upper.as_str(), "TRUE" | "T");
        return Ok(ParsedQuestion {
            name,
            text,
            question_type: QuestionType::TrueFalse,
            answers: vec![ParsedAnswer {
                text: if truth { "TRUE" } else { "FALSE" }.to_string(),
                correct: true,
                feedback: None,
                match_target: None,
            }],
            media: None,
        });
    }

    let answers = parse_answers(inner)?;
    if answers.is_empty() {
        return Err(GenError::Import(format!(
            "question \"{}\" has no answers",
            excerpt(&text)
        )));
    }

    let is_matching = answers.iter().any(|a| a.match_target.is_some());
    let correct = answers.iter().filter(|a| a.correct).count();
    let wrong = answers.len() - correct;

    let question_type = if is_matching {
        if answers.iter().any(|a| a.match_target.is_none()) {
            return Err(GenError::Import(format!(
                "matching question \"{}\" mixes pairs and plain answers",
                excerpt(&text)
            )));
        }
        if answers.len() < 2 {
            return Err(GenError::Import(format!(
                "matching question \"{}\" needs at least two pairs",
                excerpt(&text)
            )));
        }
        QuestionType::Match
    } else if wrong == 0 {
        if gapfill {
            QuestionType::GapFill
        } else {
            QuestionType::ShortAnswer
        }
    } else {
        if correct == 0 {
            return Err(GenError::Import(format!(
                "choice question \"{}\" has no correct answer",
                excerpt(&text)
            )));
        }
        QuestionType::MultiChoice
    };

    Ok(ParsedQuestion {
        name,
        text,
        question_type,
        answers,
        media: None,
    })
}

/// Split `::name::` off the front of a block, if present.
fn parse_name(block: &str) -> (Option<String>, &str) {
    if let Some(stripped) = block.strip_prefix("::") {
        if let Some(end) = stripped.find("::") {
            let name = stripped[..end].trim();
            let rest = stripped[end + 2..].trim_start();
            if !name.is_empty() {
                return (Some(name.to_string()), rest);
            }
        }
    }
    (None, block)
}

/// Split the brace interior into `=`/`~` entries, honoring backslash
/// escapes, and parse feedback (`#`) and match targets (`->`) per entry.
fn parse_answers(inner: &str) -> Result<Vec<ParsedAnswer>> {
    let mut entries: Vec<(bool, String)> = Vec::new();
    let mut current: Option<(bool, String)> = None;
    let mut escaped = false;

    for ch in inner.chars() {
        if escaped {
            if let Some((_, text)) = current.as_mut() {
                text.push(ch);
            }
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | '~' => {
                if let Some(entry) = current.take() {
                    entries.push(entry);
                }
                current = Some((ch == '=', String::new()));
            }
            _ => {
                if let Some((_, text)) = current.as_mut() {
                    text.push(ch);
                } else if !ch.is_whitespace() {
                    return Err(GenError::Import(format!(
                        "answer list does not start with = or ~: {}",
                        excerpt(inner)
                    )));
                }
            }
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }

    let mut answers = Vec::new();
    for (correct, body) in entries {
        let (body, feedback) = match body.split_once('#') {
            Some((text, feedback)) => (text.trim(), Some(feedback.trim().to_string())),
            None => (body.trim(), None),
        };
        let (text, match_target) = match body.split_once("->") {
            Some((left, right)) => (left.trim(), Some(right.trim().to_string())),
            None => (body, None),
        };
        if text.is_empty() {
            return Err(GenError::Import("answer with empty text".to_string()));
        }
        answers.push(ParsedAnswer {
            text: text.to_string(),
            correct,
            feedback: feedback.filter(|f| !f.is_empty()),
            match_target: match_target.filter(|t| !t.is_empty()),
        });
    }
    Ok(answers)
}

fn excerpt(s: &str) -> String {
    let s = s.trim();
    if s.chars().count() > 40 {
        format!("{}...", s.chars().take(40).collect::<String>())
    } else {
        s.to_string()
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Persist a unit's parsed questions into `category_id` and complete the
/// unit, all in one transaction. Questions from an earlier partial run are
/// replaced. The completion update is guarded on `importing_results`; if
/// the unit moved in the meantime (cancelled mid-import) the whole
/// transaction rolls back and `None` is returned, so no question outlives
/// a unit that did not complete.
pub async fn import_questions(
    db: &Database,
    unit: &WorkUnitRecord,
    category_id: &str,
    questions: &[ParsedQuestion],
) -> Result<Option<usize>> {
    let mut tx = db.pool().begin().await?;

    sqlx::query("DELETE FROM questions WHERE unit_id = ?")
        .bind(&unit.id)
        .execute(&mut *tx)
        .await?;

    for (index, question) in questions.iter().enumerate() {
        let answers = serde_json::to_string(&question.answers)
            .map_err(|e| GenError::Import(format!("answers not serializable: {e}")))?;
        let name = question
            .name
            .clone()
            .unwrap_or_else(|| format!("{} ({}) {}", unit.word_id, unit.question_type, index + 1));

        sqlx::query(
            r#"
            INSERT INTO questions (id, unit_id, category_id, name, question_type,
                question_text, answers, media, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&unit.id)
        .bind(category_id)
        .bind(&name)
        .bind(question.question_type.as_str())
        .bind(&question.text)
        .bind(&answers)
        .bind(&question.media)
        .bind(now_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    let completed = sqlx::query(
        "UPDATE work_units SET status = ?, modified_at = ? WHERE id = ? AND status = ?",
    )
    .bind(UnitStatus::Completed.as_str())
    .bind(now_rfc3339())
    .bind(&unit.id)
    .bind(UnitStatus::ImportingResults.as_str())
    .execute(&mut *tx)
    .await?;

    if completed.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(None);
    }
    tx.commit().await?;
    Ok(Some(questions.len()))
}

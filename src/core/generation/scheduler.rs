//! Request expansion: one generation request becomes a grid of work units.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::category::SubcatPolicy;
use crate::core::error::{GenError, Result};
use crate::core::generation::queue::JobQueue;
use crate::core::generation::types::{QuestionType, UnitStatus, VocabLevel};
use crate::core::prompt::PromptDefaults;
use crate::core::sharing::{RequestContext, Shareable};
use crate::database::models::{now_rfc3339, WorkUnitRecord};
use crate::database::{CategoryOps, Database, TemplateOps, VocabOps, WorkUnitOps};

/// A teacher's generation request. Unset fields fall back to the prompt
/// template's stored defaults.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub activity_id: String,
    pub user_id: String,
    pub word_ids: Vec<String>,
    pub prompt_id: String,
    pub format_id: Option<String>,
    pub question_types: Option<Vec<QuestionType>>,
    pub levels: Option<Vec<VocabLevel>>,
    pub count: Option<u32>,
    pub parent_category_id: Option<String>,
    pub subcat_policy: Option<u32>,
    pub subcat_name: Option<String>,
    pub review: Option<bool>,
    pub maxtries: Option<u32>,
}

/// One scheduled unit, returned so the caller can show what was queued.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub unit_id: String,
    pub word: String,
    pub question_type: QuestionType,
    pub level: VocabLevel,
    pub description: String,
}

/// Request with defaults merged in and every reference validated.
struct ResolvedRequest {
    format_id: String,
    question_types: Vec<QuestionType>,
    levels: Vec<VocabLevel>,
    count: u32,
    parent_category_id: String,
    subcat_policy: u32,
    subcat_name: Option<String>,
    review: bool,
    maxtries: u32,
}

pub struct Scheduler {
    db: Database,
    queue: Arc<JobQueue>,
}

impl Scheduler {
    pub fn new(db: Database, queue: Arc<JobQueue>) -> Self {
        Self { db, queue }
    }

    /// Validate the request, expand the word x type x level grid into work
    /// units, persist each and hand it to the queue. Returns one manifest
    /// entry per unit in creation order.
    pub async fn schedule(&self, request: &GenerationRequest) -> Result<Vec<ManifestEntry>> {
        let activity = self
            .db
            .get_activity(&request.activity_id)
            .await?
            .ok_or_else(|| {
                GenError::Config(format!("activity {} does not exist", request.activity_id))
            })?;
        let ctx = RequestContext {
            activity_id: activity.id.clone(),
            course_id: activity.course_id.clone(),
            course_category_id: activity.course_category_id.clone(),
        };

        let prompt = self
            .db
            .get_prompt_template(&request.prompt_id)
            .await?
            .filter(|t| t.is_visible_to(&request.user_id, &ctx, Utc::now()))
            .ok_or_else(|| {
                GenError::Config(format!("prompt template {} is not available", request.prompt_id))
            })?;
        let defaults = PromptDefaults::from_json(&prompt.defaults)
            .map_err(|e| GenError::Config(format!("prompt defaults unreadable: {e}")))?;

        let resolved = self.resolve(request, &defaults, &ctx).await?;

        if request.word_ids.is_empty() {
            return Err(GenError::Config("no words selected".to_string()));
        }

        let mut words = Vec::with_capacity(request.word_ids.len());
        for word_id in &request.word_ids {
            let word = self
                .db
                .get_word(word_id)
                .await?
                .filter(|w| w.activity_id == request.activity_id)
                .ok_or_else(|| {
                    GenError::Config(format!(
                        "word {word_id} does not belong to activity {}",
                        request.activity_id
                    ))
                })?;
            words.push(word);
        }

        let mut manifest = Vec::new();
        for word in &words {
            for &question_type in &resolved.question_types {
                for &level in &resolved.levels {
                    let entry = self
                        .schedule_unit(request, &resolved, &word.id, &word.headword, question_type, level)
                        .await?;
                    manifest.push(entry);
                }
            }
        }

        info!(
            activity_id = %request.activity_id,
            units = manifest.len(),
            "generation request scheduled"
        );
        Ok(manifest)
    }

    /// Merge request fields over template defaults and validate the result.
    async fn resolve(
        &self,
        request: &GenerationRequest,
        defaults: &PromptDefaults,
        ctx: &RequestContext,
    ) -> Result<ResolvedRequest> {
        let format_id = request
            .format_id
            .clone()
            .or_else(|| defaults.format_id.clone())
            .ok_or_else(|| GenError::Config("no output format selected".to_string()))?;
        self.db
            .get_format_template(&format_id)
            .await?
            .filter(|t| t.is_visible_to(&request.user_id, ctx, Utc::now()))
            .ok_or_else(|| {
                GenError::Config(format!("format template {format_id} is not available"))
            })?;

        let question_types = request
            .question_types
            .clone()
            .or_else(|| defaults.question_types.clone())
            .filter(|types| !types.is_empty())
            .ok_or_else(|| GenError::Config("no question types selected".to_string()))?;
        let levels = request
            .levels
            .clone()
            .or_else(|| defaults.levels.clone())
            .filter(|levels| !levels.is_empty())
            .ok_or_else(|| GenError::Config("no levels selected".to_string()))?;

        let count = request.count.or(defaults.count).unwrap_or(1);
        if count == 0 {
            return Err(GenError::Config("question count must be at least 1".to_string()));
        }
        let maxtries = request.maxtries.or(defaults.maxtries).unwrap_or(3);
        if maxtries == 0 {
            return Err(GenError::Config("maxtries must be at least 1".to_string()));
        }

        let parent_category_id = request
            .parent_category_id
            .clone()
            .or_else(|| defaults.parent_category_id.clone())
            .ok_or_else(|| GenError::Config("no target category selected".to_string()))?;
        self.db
            .get_category(&parent_category_id)
            .await?
            .ok_or_else(|| {
                GenError::Config(format!("parent category {parent_category_id} does not exist"))
            })?;

        let subcat_policy = request.subcat_policy.or(defaults.subcat_policy).unwrap_or(0);
        let subcat_name = request
            .subcat_name
            .clone()
            .or_else(|| defaults.subcat_name.clone());
        if SubcatPolicy(subcat_policy).contains(SubcatPolicy::CUSTOM) && subcat_name.is_none() {
            return Err(GenError::Config(
                "custom subcategory policy needs a name".to_string(),
            ));
        }

        Ok(ResolvedRequest {
            format_id,
            question_types,
            levels,
            count,
            parent_category_id,
            subcat_policy,
            subcat_name,
            review: request.review.or(defaults.review).unwrap_or(false),
            maxtries,
        })
    }

    async fn schedule_unit(
        &self,
        request: &GenerationRequest,
        resolved: &ResolvedRequest,
        word_id: &str,
        headword: &str,
        question_type: QuestionType,
        level: VocabLevel,
    ) -> Result<ManifestEntry> {
        let unit = WorkUnitRecord {
            id: Uuid::new_v4().to_string(),
            activity_id: request.activity_id.clone(),
            user_id: request.user_id.clone(),
            word_id: word_id.to_string(),
            question_type: question_type.as_str().to_string(),
            level: level.as_str().to_string(),
            count: resolved.count as i64,
            prompt_id: request.prompt_id.clone(),
            format_id: resolved.format_id.clone(),
            parent_category_id: resolved.parent_category_id.clone(),
            subcat_policy: resolved.subcat_policy as i64,
            subcat_name: resolved.subcat_name.clone(),
            review: resolved.review as i64,
            status: UnitStatus::Queued.as_str().to_string(),
            tries: 0,
            maxtries: resolved.maxtries as i64,
            error: None,
            prompt_text: None,
            results: None,
            pinned_voice: None,
            task_id: Uuid::new_v4().to_string(),
            created_at: now_rfc3339(),
            modified_at: now_rfc3339(),
        };
        self.db.create_work_unit(&unit).await?;

        // The row exists before the queue sees it; a full queue fails the
        // row immediately instead of leaving it queued forever.
        if let Err(e) = self.queue.enqueue(&unit.id) {
            warn!(unit_id = %unit.id, error = %e, "enqueue failed");
            self.db.fail_unit(&unit.id, &e.to_string()).await?;
        }

        Ok(ManifestEntry {
            unit_id: unit.id,
            word: headword.to_string(),
            question_type,
            level,
            description: format!(
                "{} {} question(s) for \"{}\" at {}",
                resolved.count, question_type, headword, level
            ),
        })
    }
}

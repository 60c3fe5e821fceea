//! Single-unit execution: the state walk from `queued` to `completed`.
//!
//! Every status write is a guarded transition; a guard that reports zero
//! affected rows means the row moved underneath us (usually cancellation)
//! and the in-flight work is discarded without touching the row further.

use std::sync::Arc;

use base64::Engine;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::core::assistant::{
    AiPayload, AiRequest, AssistantConfig, AssistantRegistry, Capability, CapabilityParams,
    InvokerFactory,
};
use crate::core::assistant::providers::{pick_voice, RANDOM_VOICE};
use crate::core::category::{resolve_category, CategoryContext, SubcatPolicy};
use crate::core::error::{GenError, Result};
use crate::core::generation::importer::{import_questions, parse_gift, ParsedQuestion};
use crate::core::generation::queue::JobQueue;
use crate::core::generation::types::UnitStatus;
use crate::core::prompt::{compose, ComposeContext, PromptDefaults};
use crate::core::sharing::{RequestContext, Shareable};
use crate::database::models::{ActivityRecord, WorkUnitRecord};
use crate::database::{AssistantOps, Database, TemplateOps, VocabOps, WorkUnitOps};

/// Everything `prepare` resolves up front, so validation failures surface
/// before the first backend call.
struct PreparedUnit {
    activity: ActivityRecord,
    word: String,
    prompt_name: String,
    prompt_body: String,
    format_body: String,
    defaults: PromptDefaults,
    text_config: AssistantConfig,
}

pub struct UnitExecutor {
    db: Database,
    queue: Arc<JobQueue>,
    registry: AssistantRegistry,
    factory: Arc<dyn InvokerFactory>,
    retry_backoff: Duration,
}

impl UnitExecutor {
    pub fn new(
        db: Database,
        queue: Arc<JobQueue>,
        registry: AssistantRegistry,
        factory: Arc<dyn InvokerFactory>,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            db,
            queue,
            registry,
            factory,
            retry_backoff,
        }
    }

    /// Execute one claimed unit end to end. `Err` is reserved for database
    /// failures; generation failures are absorbed into the unit row.
    pub async fn execute(&self, unit_id: &str) -> Result<()> {
        let Some(unit) = self.db.get_work_unit(unit_id).await? else {
            // Row deleted after enqueue, nothing to run.
            self.queue.ack(unit_id);
            return Ok(());
        };

        let lock = self.queue.lock_for(&unit.task_id);
        let result = match lock.try_lock() {
            Ok(_guard) => self.execute_locked(unit_id).await,
            Err(_) => {
                // Another path (manual approve, competing worker) holds this
                // unit; come back after a short delay.
                debug!(unit_id, "unit busy, deferring");
                self.queue.retry(unit_id, Duration::seconds(1));
                Ok(())
            }
        };
        drop(lock);
        self.queue.release(&unit.task_id);
        result
    }

    async fn execute_locked(&self, unit_id: &str) -> Result<()> {
        // Re-read inside the lock: the status may have moved while the
        // entry sat in the queue.
        let Some(unit) = self.db.get_work_unit(unit_id).await? else {
            self.queue.ack(unit_id);
            return Ok(());
        };

        let outcome = match unit.status() {
            Some(UnitStatus::Queued) => self.run_generation(&unit).await,
            Some(UnitStatus::AwaitingImport) => self.run_import_entry(&unit).await,
            other => {
                debug!(unit_id, status = ?other, "stale queue entry, skipping");
                self.queue.ack(unit_id);
                return Ok(());
            }
        };

        match outcome {
            Ok(()) => {
                self.queue.ack(unit_id);
                Ok(())
            }
            Err(GenError::Database(e)) => Err(GenError::Database(e)),
            Err(e) => self.record_failure(&unit, e).await,
        }
    }

    /// The full pipeline starting from `queued`.
    async fn run_generation(&self, unit: &WorkUnitRecord) -> Result<()> {
        if !self
            .db
            .transition_unit(&unit.id, UnitStatus::Queued.as_str(), UnitStatus::CheckingParams.as_str())
            .await?
        {
            debug!(unit_id = %unit.id, "lost transition into checking_params, discarding");
            return Ok(());
        }

        let prepared = self.prepare(unit).await?;

        let qtype = unit
            .question_type()
            .ok_or_else(|| GenError::Config(format!("unknown question type {}", unit.question_type)))?;
        let level = unit
            .level()
            .ok_or_else(|| GenError::Config(format!("unknown level {}", unit.level)))?;

        let prompt_text = compose(
            &prepared.prompt_body,
            &ComposeContext {
                word: &prepared.word,
                question_type: qtype,
                level,
                count: unit.count as u32,
                format: &prepared.format_body,
            },
        );
        if !self
            .db
            .set_unit_prompt(&unit.id, UnitStatus::CheckingParams.as_str(), &prompt_text)
            .await?
        {
            debug!(unit_id = %unit.id, "unit moved before prompt write, discarding");
            return Ok(());
        }

        if !self
            .db
            .transition_unit(
                &unit.id,
                UnitStatus::CheckingParams.as_str(),
                UnitStatus::FetchingResults.as_str(),
            )
            .await?
        {
            return Ok(());
        }

        info!(unit_id = %unit.id, word = %prepared.word, "fetching results");
        let invoker = self.factory.invoker_for(&prepared.text_config)?;
        let payload = invoker
            .generate(&AiRequest::new(&prompt_text))
            .await?
            .into_result()?;
        let results = payload
            .as_text()
            .ok_or_else(|| GenError::Parse("text backend returned binary payload".to_string()))?
            .to_string();

        if !self
            .db
            .set_unit_results(&unit.id, UnitStatus::FetchingResults.as_str(), &results)
            .await?
        {
            debug!(unit_id = %unit.id, "unit moved before results write, discarding");
            return Ok(());
        }

        if unit.review_required() {
            self.db
                .transition_unit(
                    &unit.id,
                    UnitStatus::FetchingResults.as_str(),
                    UnitStatus::AwaitingReview.as_str(),
                )
                .await?;
            info!(unit_id = %unit.id, "results stored, awaiting review");
            return Ok(());
        }

        if !self
            .db
            .transition_unit(
                &unit.id,
                UnitStatus::FetchingResults.as_str(),
                UnitStatus::ImportingResults.as_str(),
            )
            .await?
        {
            return Ok(());
        }
        self.import(unit, &prepared, &results).await
    }

    /// Entry for units approved out of review: results already stored,
    /// only the import half runs.
    async fn run_import_entry(&self, unit: &WorkUnitRecord) -> Result<()> {
        let results = unit
            .results
            .clone()
            .ok_or_else(|| GenError::Import("unit has no stored results to import".to_string()))?;

        if !self
            .db
            .transition_unit(
                &unit.id,
                UnitStatus::AwaitingImport.as_str(),
                UnitStatus::ImportingResults.as_str(),
            )
            .await?
        {
            return Ok(());
        }

        let prepared = self.prepare(unit).await?;
        self.import(unit, &prepared, &results).await
    }

    /// Resolve and validate everything the unit references. All failures
    /// here are `Config` and therefore fatal.
    async fn prepare(&self, unit: &WorkUnitRecord) -> Result<PreparedUnit> {
        let activity = self
            .db
            .get_activity(&unit.activity_id)
            .await?
            .ok_or_else(|| GenError::Config(format!("activity {} does not exist", unit.activity_id)))?;
        let word = self
            .db
            .get_word(&unit.word_id)
            .await?
            .ok_or_else(|| GenError::Config(format!("word {} does not exist", unit.word_id)))?;

        let ctx = request_context(&activity);
        let now = Utc::now();

        let prompt = self
            .db
            .get_prompt_template(&unit.prompt_id)
            .await?
            .filter(|t| t.is_visible_to(&unit.user_id, &ctx, now))
            .ok_or_else(|| {
                GenError::Config(format!("prompt template {} is not available", unit.prompt_id))
            })?;
        let format = self
            .db
            .get_format_template(&unit.format_id)
            .await?
            .filter(|t| t.is_visible_to(&unit.user_id, &ctx, now))
            .ok_or_else(|| {
                GenError::Config(format!("format template {} is not available", unit.format_id))
            })?;

        let defaults = PromptDefaults::from_json(&prompt.defaults)
            .map_err(|e| GenError::Config(format!("prompt defaults unreadable: {e}")))?;

        let text_config = self
            .resolve_config(&defaults.text_config_id, Capability::Text, &unit.user_id, &ctx)
            .await?
            .ok_or_else(|| GenError::Config("no text backend configured".to_string()))?;

        Ok(PreparedUnit {
            activity,
            word: word.headword,
            prompt_name: prompt.name,
            prompt_body: prompt.body,
            format_body: format.body,
            defaults,
            text_config,
        })
    }

    /// A pinned config id wins; otherwise the registry auto-selects.
    /// A pinned id that is gone or out of scope is a config error, not a
    /// silent fallback.
    async fn resolve_config(
        &self,
        pinned: &Option<String>,
        capability: Capability,
        user_id: &str,
        ctx: &RequestContext,
    ) -> Result<Option<AssistantConfig>> {
        match pinned {
            Some(id) => {
                let record = self
                    .db
                    .get_assistant_config(id)
                    .await?
                    .filter(|r| r.owner_id == user_id || r.is_visible_to(user_id, ctx, Utc::now()))
                    .ok_or_else(|| {
                        GenError::Config(format!("assistant config {id} is not available"))
                    })?;
                let config = AssistantConfig::from_record(&record)?;
                if config.capability() != capability {
                    return Err(GenError::Config(format!(
                        "assistant config {id} is not a {} backend",
                        capability.as_str()
                    )));
                }
                Ok(Some(config))
            }
            None => self.registry.find_active(capability, user_id, ctx, Utc::now()).await,
        }
    }

    /// Parse, resolve the target category, attach media, persist, complete.
    async fn import(&self, unit: &WorkUnitRecord, prepared: &PreparedUnit, results: &str) -> Result<()> {
        let mut questions = parse_gift(results)?;

        let category_id = resolve_category(
            &self.db,
            &unit.parent_category_id,
            SubcatPolicy(unit.subcat_policy as u32),
            &CategoryContext {
                custom_name: unit.subcat_name.clone(),
                course_name: prepared.activity.course_name.clone(),
                section_name: prepared.activity.section_name.clone(),
                activity_name: prepared.activity.name.clone(),
                prompt_name: prepared.prompt_name.clone(),
                word: prepared.word.clone(),
                question_type: unit.question_type(),
                level: unit.level(),
            },
        )
        .await?;

        self.attach_media(unit, prepared, &mut questions).await?;

        // The write and the completion share one transaction: a unit
        // cancelled mid-import rolls the questions back too.
        let Some(written) = import_questions(&self.db, unit, &category_id, &questions).await? else {
            debug!(unit_id = %unit.id, "unit moved during import, output discarded");
            return Ok(());
        };
        info!(unit_id = %unit.id, written, category_id = %category_id, "unit completed");
        Ok(())
    }

    /// Generate illustrations, pronunciations or clips when the prompt
    /// template binds a media backend. One media kind per question: when
    /// the template binds several, image wins over audio and audio over
    /// video. Media is best effort: a failed call is logged and the
    /// question imported without it, so a flaky image endpoint cannot burn
    /// the unit's retry budget.
    async fn attach_media(
        &self,
        unit: &WorkUnitRecord,
        prepared: &PreparedUnit,
        questions: &mut [ParsedQuestion],
    ) -> Result<()> {
        let ctx = request_context(&prepared.activity);

        if let Some(config) = self
            .resolve_config(&prepared.defaults.image_config_id, Capability::Image, &unit.user_id, &ctx)
            .await?
        {
            let invoker = self.factory.invoker_for(&config)?;
            for question in questions.iter_mut() {
                let request =
                    AiRequest::new(format!("Illustrate the word \"{}\": {}", prepared.word, question.text));
                match invoker.generate(&request).await.and_then(|o| o.into_result()) {
                    Ok(payload) => question.media = Some(media_value(payload)),
                    Err(e) => warn!(unit_id = %unit.id, error = %e, "image generation failed"),
                }
            }
        } else if let Some(config) = self
            .resolve_config(&prepared.defaults.audio_config_id, Capability::Audio, &unit.user_id, &ctx)
            .await?
        {
            let voice = self.pinned_voice(unit, &config).await?;
            let invoker = self.factory.invoker_for(&config)?;
            for question in questions.iter_mut() {
                let request = AiRequest::new(&prepared.word).with_voice(&voice);
                match invoker.generate(&request).await.and_then(|o| o.into_result()) {
                    Ok(payload) => question.media = Some(media_value(payload)),
                    Err(e) => warn!(unit_id = %unit.id, error = %e, "audio generation failed"),
                }
            }
        } else if let Some(config) = self
            .resolve_config(&prepared.defaults.video_config_id, Capability::Video, &unit.user_id, &ctx)
            .await?
        {
            let invoker = self.factory.invoker_for(&config)?;
            for question in questions.iter_mut() {
                let request = AiRequest::new(format!(
                    "A short clip illustrating the word \"{}\": {}",
                    prepared.word, question.text
                ));
                match invoker.generate(&request).await.and_then(|o| o.into_result()) {
                    Ok(payload) => question.media = Some(media_value(payload)),
                    Err(e) => warn!(unit_id = %unit.id, error = %e, "video generation failed"),
                }
            }
        }
        Ok(())
    }

    /// All audio for a unit speaks with one voice. A "random" config voice
    /// is drawn once and persisted, so retries and redo-imports reuse it.
    async fn pinned_voice(&self, unit: &WorkUnitRecord, config: &AssistantConfig) -> Result<String> {
        if let Some(voice) = &unit.pinned_voice {
            return Ok(voice.clone());
        }
        let configured = match &config.params {
            CapabilityParams::Audio(params) => params.voice.clone(),
            _ => RANDOM_VOICE.to_string(),
        };
        let voice = if configured == RANDOM_VOICE {
            pick_voice(&mut rand::thread_rng()).to_string()
        } else {
            configured
        };
        self.db.set_pinned_voice(&unit.id, &voice).await?;
        Ok(voice)
    }

    /// Route a generation failure: retryable errors go back to the queue
    /// while the attempt budget lasts, everything else is terminal.
    async fn record_failure(&self, unit: &WorkUnitRecord, error: GenError) -> Result<()> {
        let message = error.to_string();
        if error.is_retryable() && self.db.requeue_unit(&unit.id, &message).await? {
            warn!(unit_id = %unit.id, error = %message, "attempt failed, requeued");
            self.queue.retry(&unit.id, self.retry_backoff);
        } else {
            warn!(unit_id = %unit.id, error = %message, "unit failed");
            self.db.fail_unit(&unit.id, &message).await?;
            self.queue.ack(&unit.id);
        }
        Ok(())
    }
}

fn request_context(activity: &ActivityRecord) -> RequestContext {
    RequestContext {
        activity_id: activity.id.clone(),
        course_id: activity.course_id.clone(),
        course_category_id: activity.course_category_id.clone(),
    }
}

/// Stringify a media payload for the question row: URLs and text pass
/// through, raw audio bytes become a data URI.
fn media_value(payload: AiPayload) -> String {
    match payload {
        AiPayload::Text(s) => s,
        AiPayload::Binary(bytes) => format!(
            "data:audio/mpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ),
    }
}

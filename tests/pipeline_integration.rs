//! End-to-end pipeline tests over an in-memory database and a scripted
//! backend factory: schedule, execute, review, retry, cancel and redo.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use vocabforge::core::assistant::{
    AiInvoker, AiOutcome, AiPayload, AiRequest, AssistantConfig, AssistantRegistry, Capability,
    InvokerFactory,
};
use vocabforge::core::category::SubcatPolicy;
use vocabforge::core::error::Result;
use vocabforge::core::generation::{
    GenerationLog, GenerationRequest, JobQueue, QuestionType, Scheduler, UnitExecutor, VocabLevel,
};
use vocabforge::database::models::{
    now_rfc3339, ActivityRecord, AssistantConfigRecord, FormatTemplateRecord, PromptTemplateRecord,
    WordRecord,
};
use vocabforge::database::{
    AssistantOps, CategoryOps, Database, QuestionOps, TemplateOps, VocabOps, WorkUnitOps,
};

const DEFAULT_GIFT: &str =
    "What colour is a ripe apple? {=red ~blue ~green}\n\nAn apple is a fruit. {TRUE}";

// ============================================================================
// Scripted backend
// ============================================================================

#[derive(Default)]
struct ScriptedBackend {
    responses: Mutex<VecDeque<AiOutcome>>,
    calls: AtomicUsize,
    /// Voice carried by each audio request, in call order.
    voices: Mutex<Vec<Option<String>>>,
    /// One-shot rendezvous for the next audio call: the first barrier is
    /// crossed when the call starts, the second before it replies. Lets a
    /// test act while the worker sits inside a backend call.
    audio_gate: Mutex<Option<(Arc<tokio::sync::Barrier>, Arc<tokio::sync::Barrier>)>>,
}

impl ScriptedBackend {
    fn push(&self, outcome: AiOutcome) {
        self.responses.lock().unwrap().push_back(outcome);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct ScriptedInvoker {
    capability: Capability,
    backend: Arc<ScriptedBackend>,
}

#[async_trait]
impl AiInvoker for ScriptedInvoker {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn generate(&self, request: &AiRequest) -> Result<AiOutcome> {
        self.backend.calls.fetch_add(1, Ordering::SeqCst);
        if self.capability == Capability::Audio {
            self.backend.voices.lock().unwrap().push(request.voice.clone());
            let gate = self.backend.audio_gate.lock().unwrap().take();
            if let Some((started, resume)) = gate {
                started.wait().await;
                resume.wait().await;
            }
        }
        let scripted = self.backend.responses.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| AiOutcome::data(AiPayload::Text(DEFAULT_GIFT.to_string()))))
    }
}

struct ScriptedFactory {
    backend: Arc<ScriptedBackend>,
}

impl InvokerFactory for ScriptedFactory {
    fn invoker_for(&self, config: &AssistantConfig) -> Result<Arc<dyn AiInvoker>> {
        Ok(Arc::new(ScriptedInvoker {
            capability: config.capability(),
            backend: self.backend.clone(),
        }))
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    db: Database,
    queue: Arc<JobQueue>,
    scheduler: Scheduler,
    executor: Arc<UnitExecutor>,
    log: GenerationLog,
    backend: Arc<ScriptedBackend>,
    root_category: String,
}

impl Fixture {
    async fn new() -> Self {
        let db = Database::open_in_memory().await.unwrap();
        let queue = Arc::new(JobQueue::new(64));
        let backend = Arc::new(ScriptedBackend::default());

        db.create_activity(&ActivityRecord {
            id: "act1".into(),
            name: "Food vocabulary".into(),
            course_id: "course1".into(),
            course_name: "English 101".into(),
            section_name: "Week 3".into(),
            course_category_id: "coursecat1".into(),
            created_at: now_rfc3339(),
        })
        .await
        .unwrap();
        for (id, headword) in [("w-apple", "apple"), ("w-pear", "pear")] {
            db.create_word(&WordRecord {
                id: id.into(),
                activity_id: "act1".into(),
                headword: headword.into(),
                created_at: now_rfc3339(),
            })
            .await
            .unwrap();
        }

        db.create_prompt_template(&PromptTemplateRecord {
            id: "prompt1".into(),
            owner_id: "teacher".into(),
            name: "Standard prompt".into(),
            body: "Write {{count}} {{qtype}} questions about \"{{word}}\" at {{level}}. {{format}}"
                .into(),
            defaults: "{}".into(),
            context_level: "activity".into(),
            context_id: "act1".into(),
            shared_from: None,
            shared_until: None,
            created_at: now_rfc3339(),
            modified_at: now_rfc3339(),
        })
        .await
        .unwrap();
        db.create_format_template(&FormatTemplateRecord {
            id: "format1".into(),
            owner_id: "teacher".into(),
            name: "GIFT".into(),
            body: "Answer in GIFT format.".into(),
            context_level: "activity".into(),
            context_id: "act1".into(),
            shared_from: None,
            shared_until: None,
            created_at: now_rfc3339(),
            modified_at: now_rfc3339(),
        })
        .await
        .unwrap();
        db.create_assistant_config(&AssistantConfigRecord {
            id: "cfg-text".into(),
            owner_id: "teacher".into(),
            capability: "text".into(),
            endpoint: "https://api.example.com/v1/chat/completions".into(),
            api_key: "sk-test".into(),
            model: "gpt-4o".into(),
            params: r#"{"capability":"text"}"#.into(),
            context_level: "activity".into(),
            context_id: "act1".into(),
            shared_from: None,
            shared_until: None,
            created_at: now_rfc3339(),
            modified_at: now_rfc3339(),
        })
        .await
        .unwrap();

        let root_category = db.create_root_category("Question bank").await.unwrap().id;

        let factory = Arc::new(ScriptedFactory {
            backend: backend.clone(),
        });
        let executor = Arc::new(UnitExecutor::new(
            db.clone(),
            queue.clone(),
            AssistantRegistry::new(db.clone()),
            factory,
            chrono::Duration::zero(),
        ));

        Self {
            scheduler: Scheduler::new(db.clone(), queue.clone()),
            log: GenerationLog::new(db.clone(), queue.clone()),
            db,
            queue: queue.clone(),
            executor,
            backend,
            root_category,
        }
    }

    fn request(&self) -> GenerationRequest {
        GenerationRequest {
            activity_id: "act1".into(),
            user_id: "teacher".into(),
            word_ids: vec!["w-apple".into()],
            prompt_id: "prompt1".into(),
            format_id: Some("format1".into()),
            question_types: Some(vec![QuestionType::MultiChoice]),
            levels: Some(vec![VocabLevel::A2]),
            count: Some(2),
            parent_category_id: Some(self.root_category.clone()),
            subcat_policy: Some(0),
            subcat_name: None,
            review: Some(false),
            maxtries: Some(3),
        }
    }

    /// Run every claimable unit to a resting state.
    async fn drain(&self) {
        while let Some(unit_id) = self.queue.claim() {
            self.executor.execute(&unit_id).await.unwrap();
        }
    }

    /// Register an audio backend and a prompt template bound to it.
    async fn bind_audio_prompt(&self) {
        self.db
            .create_assistant_config(&AssistantConfigRecord {
                id: "cfg-audio".into(),
                owner_id: "teacher".into(),
                capability: "audio".into(),
                endpoint: "https://api.example.com/v1/audio/speech".into(),
                api_key: "sk-test".into(),
                model: "tts-1".into(),
                params: r#"{"capability":"audio","voice":"random"}"#.into(),
                context_level: "activity".into(),
                context_id: "act1".into(),
                shared_from: None,
                shared_until: None,
                created_at: now_rfc3339(),
                modified_at: now_rfc3339(),
            })
            .await
            .unwrap();
        self.db
            .create_prompt_template(&PromptTemplateRecord {
                id: "prompt-audio".into(),
                owner_id: "teacher".into(),
                name: "Spoken prompt".into(),
                body: "Write {{count}} {{qtype}} questions about \"{{word}}\". {{format}}".into(),
                defaults: r#"{"audio_config_id":"cfg-audio"}"#.into(),
                context_level: "activity".into(),
                context_id: "act1".into(),
                shared_from: None,
                shared_until: None,
                created_at: now_rfc3339(),
                modified_at: now_rfc3339(),
            })
            .await
            .unwrap();
    }
}

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test]
async fn schedule_expands_word_type_level_grid() {
    let fx = Fixture::new().await;
    let mut request = fx.request();
    request.word_ids = vec!["w-apple".into(), "w-pear".into()];
    request.question_types = Some(vec![QuestionType::MultiChoice, QuestionType::TrueFalse]);
    request.levels = Some(vec![VocabLevel::A1, VocabLevel::A2]);

    let manifest = fx.scheduler.schedule(&request).await.unwrap();
    assert_eq!(manifest.len(), 8);
    assert_eq!(fx.queue.len(), 8);

    let combos: HashSet<_> = manifest
        .iter()
        .map(|e| (e.word.clone(), e.question_type, e.level))
        .collect();
    assert_eq!(combos.len(), 8, "every unit covers a distinct combination");

    let units = fx.db.list_work_units("act1").await.unwrap();
    assert_eq!(units.len(), 8);
    assert!(units.iter().all(|u| u.status == "queued" && u.tries == 0));
}

#[tokio::test]
async fn schedule_rejects_missing_references() {
    let fx = Fixture::new().await;

    let mut request = fx.request();
    request.word_ids = vec!["w-nonexistent".into()];
    assert!(fx.scheduler.schedule(&request).await.is_err());

    let mut request = fx.request();
    request.parent_category_id = Some("no-such-category".into());
    assert!(fx.scheduler.schedule(&request).await.is_err());

    let mut request = fx.request();
    request.count = Some(0);
    assert!(fx.scheduler.schedule(&request).await.is_err());
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn happy_path_imports_questions() {
    let fx = Fixture::new().await;
    let manifest = fx.scheduler.schedule(&fx.request()).await.unwrap();
    fx.drain().await;

    let unit = fx
        .db
        .get_work_unit(&manifest[0].unit_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unit.status, "completed");
    assert!(unit.prompt_text.as_deref().unwrap().contains("\"apple\""));
    assert!(unit.results.is_some());

    let questions = fx.db.list_questions_for_unit(&unit.id).await.unwrap();
    assert_eq!(questions.len(), 2);
    // No subcategory policy: questions land directly in the parent.
    assert!(questions.iter().all(|q| q.category_id == fx.root_category));
}

#[tokio::test]
async fn subcategories_created_once_and_shared() {
    let fx = Fixture::new().await;
    let mut request = fx.request();
    request.subcat_policy = Some((SubcatPolicy::WORD | SubcatPolicy::QUESTION_TYPE).0);
    request.levels = Some(vec![VocabLevel::A1, VocabLevel::A2]);

    fx.scheduler.schedule(&request).await.unwrap();
    fx.drain().await;

    // Both units target word+type subcategories; the chain is created once.
    let roots = fx.db.list_children(&fx.root_category).await.unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].name, "apple");
    let leaves = fx.db.list_children(&roots[0].id).await.unwrap();
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].name, "apple (multichoice)");

    let questions = fx.db.list_questions_in_category(&leaves[0].id).await.unwrap();
    assert_eq!(questions.len(), 4, "both units imported into the shared leaf");
}

#[tokio::test]
async fn transport_failure_with_single_try_fails_both_units() {
    let fx = Fixture::new().await;
    let mut request = fx.request();
    request.word_ids = vec!["w-apple".into(), "w-pear".into()];
    request.maxtries = Some(1);
    fx.backend.push(AiOutcome::error("upstream 500"));
    fx.backend.push(AiOutcome::error("upstream 500"));

    let manifest = fx.scheduler.schedule(&request).await.unwrap();
    assert_eq!(manifest.len(), 2);
    fx.drain().await;

    for entry in &manifest {
        let unit = fx.db.get_work_unit(&entry.unit_id).await.unwrap().unwrap();
        assert_eq!(unit.status, "failed");
        assert_eq!(unit.tries, 1);
        assert!(unit.error.as_deref().unwrap().contains("upstream 500"));
        assert_eq!(fx.db.count_questions_for_unit(&unit.id).await.unwrap(), 0);
    }
    assert_eq!(fx.backend.calls(), 2, "no second attempts with maxtries=1");
}

#[tokio::test]
async fn transient_failure_retried_until_success() {
    let fx = Fixture::new().await;
    fx.backend.push(AiOutcome::error("connection reset"));
    // Second call falls through to the default successful payload.

    let manifest = fx.scheduler.schedule(&fx.request()).await.unwrap();
    fx.drain().await;

    let unit = fx
        .db
        .get_work_unit(&manifest[0].unit_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unit.status, "completed");
    assert_eq!(unit.tries, 1, "one failed attempt recorded");
    assert_eq!(fx.backend.calls(), 2);
    assert_eq!(fx.db.count_questions_for_unit(&unit.id).await.unwrap(), 2);
}

#[tokio::test]
async fn empty_output_is_retryable() {
    let fx = Fixture::new().await;
    let mut request = fx.request();
    request.maxtries = Some(2);
    fx.backend.push(AiOutcome::data(AiPayload::Text("   ".into())));
    fx.backend.push(AiOutcome::data(AiPayload::Text("".into())));

    let manifest = fx.scheduler.schedule(&request).await.unwrap();
    fx.drain().await;

    let unit = fx
        .db
        .get_work_unit(&manifest[0].unit_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unit.status, "failed");
    assert_eq!(unit.tries, 2, "budget fully spent on empty outputs");
}

#[tokio::test]
async fn missing_backend_config_fails_fatally() {
    let fx = Fixture::new().await;
    fx.db.delete_assistant_config("cfg-text").await.unwrap();

    let manifest = fx.scheduler.schedule(&fx.request()).await.unwrap();
    fx.drain().await;

    let unit = fx
        .db
        .get_work_unit(&manifest[0].unit_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unit.status, "failed");
    assert_eq!(unit.tries, 1, "config errors never retry");
    assert_eq!(fx.backend.calls(), 0);
}

#[tokio::test]
async fn audio_media_uses_one_pinned_voice_per_unit() {
    let fx = Fixture::new().await;
    fx.bind_audio_prompt().await;

    let mut request = fx.request();
    request.prompt_id = "prompt-audio".into();
    let manifest = fx.scheduler.schedule(&request).await.unwrap();
    fx.drain().await;

    let unit = fx
        .db
        .get_work_unit(&manifest[0].unit_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unit.status, "completed");

    let pinned = unit.pinned_voice.expect("random voice pinned on the unit");
    let voices = fx.backend.voices.lock().unwrap().clone();
    assert_eq!(voices.len(), 2, "one audio call per imported question");
    assert!(
        voices.iter().all(|v| v.as_deref() == Some(pinned.as_str())),
        "every audio call carries the pinned voice"
    );

    let questions = fx.db.list_questions_for_unit(&unit.id).await.unwrap();
    assert!(questions.iter().all(|q| q.media.is_some()));
}

#[tokio::test]
async fn video_backend_attaches_clips_when_bound() {
    let fx = Fixture::new().await;
    fx.db
        .create_assistant_config(&AssistantConfigRecord {
            id: "cfg-video".into(),
            owner_id: "teacher".into(),
            capability: "video".into(),
            endpoint: "https://api.example.com/v1/videos".into(),
            api_key: "sk-test".into(),
            model: "sora-lite".into(),
            params: r#"{"capability":"video"}"#.into(),
            context_level: "activity".into(),
            context_id: "act1".into(),
            shared_from: None,
            shared_until: None,
            created_at: now_rfc3339(),
            modified_at: now_rfc3339(),
        })
        .await
        .unwrap();
    fx.db
        .create_prompt_template(&PromptTemplateRecord {
            id: "prompt-video".into(),
            owner_id: "teacher".into(),
            name: "Clip prompt".into(),
            body: "Write {{count}} {{qtype}} questions about \"{{word}}\". {{format}}".into(),
            defaults: r#"{"video_config_id":"cfg-video"}"#.into(),
            context_level: "activity".into(),
            context_id: "act1".into(),
            shared_from: None,
            shared_until: None,
            created_at: now_rfc3339(),
            modified_at: now_rfc3339(),
        })
        .await
        .unwrap();

    let mut request = fx.request();
    request.prompt_id = "prompt-video".into();
    let manifest = fx.scheduler.schedule(&request).await.unwrap();
    fx.drain().await;

    let unit = fx
        .db
        .get_work_unit(&manifest[0].unit_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unit.status, "completed");
    assert_eq!(fx.backend.calls(), 3, "one text call plus one clip per question");

    let questions = fx.db.list_questions_for_unit(&unit.id).await.unwrap();
    assert_eq!(questions.len(), 2);
    assert!(questions.iter().all(|q| q.media.is_some()));
}

// ============================================================================
// Review
// ============================================================================

#[tokio::test]
async fn review_stalls_until_approved() {
    let fx = Fixture::new().await;
    let mut request = fx.request();
    request.review = Some(true);

    let manifest = fx.scheduler.schedule(&request).await.unwrap();
    fx.drain().await;

    let unit_id = &manifest[0].unit_id;
    let unit = fx.db.get_work_unit(unit_id).await.unwrap().unwrap();
    assert_eq!(unit.status, "awaiting_review");
    assert!(unit.results.is_some());
    assert_eq!(fx.db.count_questions_for_unit(unit_id).await.unwrap(), 0);

    fx.log.approve(unit_id).await.unwrap();
    fx.drain().await;

    let unit = fx.db.get_work_unit(unit_id).await.unwrap().unwrap();
    assert_eq!(unit.status, "completed");
    assert_eq!(fx.db.count_questions_for_unit(unit_id).await.unwrap(), 2);
    assert_eq!(fx.backend.calls(), 1, "approval imports stored results, no refetch");
}

#[tokio::test]
async fn rejected_results_never_imported() {
    let fx = Fixture::new().await;
    let mut request = fx.request();
    request.review = Some(true);

    let manifest = fx.scheduler.schedule(&request).await.unwrap();
    fx.drain().await;

    let unit_id = &manifest[0].unit_id;
    fx.log.reject(unit_id, Some("wrong register")).await.unwrap();
    fx.drain().await;

    let unit = fx.db.get_work_unit(unit_id).await.unwrap().unwrap();
    assert_eq!(unit.status, "failed");
    assert_eq!(fx.db.count_questions_for_unit(unit_id).await.unwrap(), 0);
}

// ============================================================================
// Cancel and redo
// ============================================================================

#[tokio::test]
async fn cancelled_unit_is_discarded_by_workers() {
    let fx = Fixture::new().await;
    let manifest = fx.scheduler.schedule(&fx.request()).await.unwrap();
    let unit_id = &manifest[0].unit_id;

    fx.log.cancel(unit_id).await.unwrap();
    fx.drain().await;

    let unit = fx.db.get_work_unit(unit_id).await.unwrap().unwrap();
    assert_eq!(unit.status, "cancelled");
    assert_eq!(fx.backend.calls(), 0);
    assert_eq!(fx.db.count_questions_for_unit(unit_id).await.unwrap(), 0);
}

#[tokio::test]
async fn cancel_during_import_discards_questions() {
    let fx = Fixture::new().await;
    fx.bind_audio_prompt().await;

    let mut request = fx.request();
    request.prompt_id = "prompt-audio".into();
    let manifest = fx.scheduler.schedule(&request).await.unwrap();
    let unit_id = manifest[0].unit_id.clone();

    let started = Arc::new(tokio::sync::Barrier::new(2));
    let resume = Arc::new(tokio::sync::Barrier::new(2));
    *fx.backend.audio_gate.lock().unwrap() = Some((started.clone(), resume.clone()));

    let claimed = fx.queue.claim().unwrap();
    let executor = fx.executor.clone();
    let worker = tokio::spawn(async move { executor.execute(&claimed).await });

    // The worker is now past fetching and inside media generation.
    started.wait().await;
    fx.log.cancel(&unit_id).await.unwrap();
    resume.wait().await;
    worker.await.unwrap().unwrap();

    let unit = fx.db.get_work_unit(&unit_id).await.unwrap().unwrap();
    assert_eq!(unit.status, "cancelled");
    assert_eq!(
        fx.db.count_questions_for_unit(&unit_id).await.unwrap(),
        0,
        "a late import must not outlive the cancellation"
    );
}

#[tokio::test]
async fn redo_resets_and_reruns_a_failed_unit() {
    let fx = Fixture::new().await;
    let mut request = fx.request();
    request.maxtries = Some(1);
    fx.backend.push(AiOutcome::error("upstream 500"));

    let manifest = fx.scheduler.schedule(&request).await.unwrap();
    fx.drain().await;
    let unit_id = &manifest[0].unit_id;
    assert_eq!(
        fx.db.get_work_unit(unit_id).await.unwrap().unwrap().status,
        "failed"
    );

    fx.log.redo(unit_id).await.unwrap();
    let unit = fx.db.get_work_unit(unit_id).await.unwrap().unwrap();
    assert_eq!(unit.status, "queued");
    assert_eq!(unit.tries, 0);

    fx.drain().await;
    let unit = fx.db.get_work_unit(unit_id).await.unwrap().unwrap();
    assert_eq!(unit.status, "completed");
    assert_eq!(fx.db.count_questions_for_unit(unit_id).await.unwrap(), 2);
}

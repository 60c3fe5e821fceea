//! The question-generation pipeline: scheduling, queueing, execution and
//! the teacher-facing log operations.

pub mod executor;
pub mod importer;
pub mod log;
pub mod queue;
pub mod scheduler;
pub mod types;
pub mod worker;

pub use executor::UnitExecutor;
pub use importer::{parse_gift, ParsedAnswer, ParsedQuestion};
pub use log::GenerationLog;
pub use queue::JobQueue;
pub use scheduler::{GenerationRequest, ManifestEntry, Scheduler};
pub use types::{QuestionType, UnitStatus, VocabLevel};
pub use worker::WorkerPool;

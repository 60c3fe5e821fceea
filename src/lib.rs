/// Vocabforge - Deferred AI Question Generation
///
/// Core library providing the generation scheduler, durable work-unit log,
/// background workers, AI backend invokers and the question importer.

pub mod config;
pub mod core;
pub mod database;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

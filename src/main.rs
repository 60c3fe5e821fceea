use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use vocabforge::config::AppConfig;
use vocabforge::core::assistant::{AssistantRegistry, HttpInvokerFactory};
use vocabforge::core::generation::types::UnitStatus;
use vocabforge::core::generation::{JobQueue, UnitExecutor, WorkerPool};
use vocabforge::core::logging;
use vocabforge::database::{Database, WorkUnitOps};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    info!("Vocabforge v{} starting", vocabforge::VERSION);

    let config = AppConfig::load();
    std::fs::create_dir_all(config.data_dir())?;

    let db = Database::open(&config.database_path()).await?;
    let queue = Arc::new(JobQueue::new(config.worker.max_queue_size));

    // Units interrupted by a previous shutdown go straight back on the
    // queue; the database is the authority, the queue is just a schedule.
    let mut recovered = 0;
    for status in [UnitStatus::Queued, UnitStatus::AwaitingImport] {
        for unit in db.list_units_with_status(status.as_str()).await? {
            match queue.enqueue(&unit.id) {
                Ok(()) => recovered += 1,
                Err(e) => {
                    error!(unit_id = %unit.id, error = %e, "recovery enqueue failed");
                    db.fail_unit(&unit.id, &e.to_string()).await?;
                }
            }
        }
    }
    if recovered > 0 {
        info!(recovered, "requeued interrupted units");
    }

    let executor = Arc::new(UnitExecutor::new(
        db.clone(),
        queue.clone(),
        AssistantRegistry::new(db.clone()),
        Arc::new(HttpInvokerFactory::new(Duration::from_secs(
            config.http.timeout_secs,
        ))),
        chrono::Duration::seconds(config.worker.retry_backoff_secs as i64),
    ));

    let pool = WorkerPool::new(
        queue.clone(),
        executor,
        config.worker.count,
        Duration::from_millis(config.worker.poll_interval_ms),
    );

    let shutdown_queue = queue.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown_queue.shutdown();
        }
    });

    pool.run().await;
    info!("all workers stopped");
    Ok(())
}

//! Geoperms standalone reconciliation worker.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use geoperms_application::{ExecutionTracker, ReconciliationWorker, SpecCodec};
use geoperms_core::AppError;
use geoperms_infrastructure::{PostgresCatalogRepository, PostgresExecutionRepository};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    worker_id: String,
    poll_interval_ms: u64,
}

impl WorkerConfig {
    fn load() -> Result<Self, AppError> {
        let database_url = required_env("DATABASE_URL")?;
        let worker_id = env::var("GEOPERMS_WORKER_ID")
            .unwrap_or_else(|_| format!("worker-{}", std::process::id()));
        let poll_interval_ms = env::var("GEOPERMS_WORKER_POLL_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(500);

        Ok(Self {
            database_url,
            worker_id,
            poll_interval_ms,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .map_err(|error| AppError::Storage(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Storage(format!("failed to run migrations: {error}")))?;

    let catalog = Arc::new(PostgresCatalogRepository::new(pool.clone()));
    let executions = Arc::new(PostgresExecutionRepository::new(pool));
    let codec = SpecCodec::new(catalog.clone());
    let tracker = ExecutionTracker::new(catalog.clone(), catalog, executions, codec);

    let worker = ReconciliationWorker::new(
        tracker,
        config.worker_id.clone(),
        Duration::from_millis(config.poll_interval_ms),
    );

    info!(
        worker_id = %config.worker_id,
        poll_interval_ms = config.poll_interval_ms,
        "geoperms-worker started"
    );

    worker.run_loop().await;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

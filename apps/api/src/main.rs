//! Geoperms API composition root.

#![forbid(unsafe_code)]

mod dev_seed;
mod dto;
mod error;
mod handlers;
mod middleware;
mod router;
mod state;

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use geoperms_application::{
    AssignmentRepository, ExecutionRepository, ExecutionTracker, PermissionGateway,
    ReconciliationWorker, ResourceRepository, SpecCodec, SubjectDirectory,
};
use geoperms_core::AppError;
use geoperms_infrastructure::{
    InMemoryCatalogRepository, InMemoryExecutionRepository, PostgresCatalogRepository,
    PostgresExecutionRepository,
};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

struct Repositories {
    resources: Arc<dyn ResourceRepository>,
    directory: Arc<dyn SubjectDirectory>,
    assignments: Arc<dyn AssignmentRepository>,
    executions: Arc<dyn ExecutionRepository>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let api_host = env::var("GEOPERMS_API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let api_port = env::var("GEOPERMS_API_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3001);
    let storage = env::var("GEOPERMS_STORAGE").unwrap_or_else(|_| "memory".to_owned());
    let worker_count = env::var("GEOPERMS_WORKER_COUNT")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(1)
        .max(1);
    let poll_interval_ms = env::var("GEOPERMS_WORKER_POLL_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(500);
    let dev_seed_enabled = env::var("GEOPERMS_DEV_SEED")
        .unwrap_or_else(|_| "false".to_owned())
        .eq_ignore_ascii_case("true");

    let repositories = match storage.as_str() {
        "memory" => {
            let catalog = Arc::new(InMemoryCatalogRepository::new());
            if dev_seed_enabled {
                dev_seed::run(&catalog).await?;
            }

            Repositories {
                resources: catalog.clone(),
                directory: catalog.clone(),
                assignments: catalog,
                executions: Arc::new(InMemoryExecutionRepository::new()),
            }
        }
        "postgres" => {
            let database_url = required_env("DATABASE_URL")?;
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&database_url)
                .await
                .map_err(|error| {
                    AppError::Storage(format!("failed to connect to database: {error}"))
                })?;

            sqlx::migrate!("../../crates/infrastructure/migrations")
                .run(&pool)
                .await
                .map_err(|error| {
                    AppError::Storage(format!("failed to run migrations: {error}"))
                })?;

            let catalog = Arc::new(PostgresCatalogRepository::new(pool.clone()));
            Repositories {
                resources: catalog.clone(),
                directory: catalog.clone(),
                assignments: catalog,
                executions: Arc::new(PostgresExecutionRepository::new(pool)),
            }
        }
        other => {
            return Err(AppError::Validation(format!(
                "GEOPERMS_STORAGE must be either 'memory' or 'postgres', got '{other}'"
            )));
        }
    };

    let codec = SpecCodec::new(repositories.directory.clone());
    let tracker = ExecutionTracker::new(
        repositories.resources.clone(),
        repositories.assignments.clone(),
        repositories.executions,
        codec.clone(),
    );

    for index in 0..worker_count {
        let worker = ReconciliationWorker::new(
            tracker.clone(),
            format!("api-worker-{index}"),
            Duration::from_millis(poll_interval_ms),
        );
        tokio::spawn(async move { worker.run_loop().await });
    }

    let gateway = PermissionGateway::new(
        repositories.resources,
        repositories.directory.clone(),
        repositories.assignments,
        tracker,
        codec,
    );
    let app_state = AppState {
        gateway,
        directory: repositories.directory,
    };

    let app = router::build_router(app_state);

    let host = IpAddr::from_str(&api_host).map_err(|error| {
        AppError::Internal(format!("invalid GEOPERMS_API_HOST '{api_host}': {error}"))
    })?;
    let address = SocketAddr::from((host, api_port));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, storage, worker_count, "geoperms-api listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))
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

use async_trait::async_trait;
use geoperms_application::{
    CreateExecutionInput, ExecutionRepository, ExecutionRequest, ExecutionStatus,
};
use geoperms_core::{AppError, AppResult, ExecutionId, ResourceId};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;


/// PostgreSQL-backed execution store.
///
/// `claim_next` serializes per resource: a candidate must be the oldest
/// non-terminal execution of its resource, and `FOR UPDATE SKIP LOCKED`
/// lets concurrent claimers pass over each other's locked candidate.
/// While one claimer holds the oldest row of a resource, its younger
/// siblings fail the oldest-pending check, so the whole resource is
/// skipped rather than handed out twice.
#[derive(Clone)]
pub struct PostgresExecutionRepository {
    pool: PgPool,
}

impl PostgresExecutionRepository {
    /// Creates an execution repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn transition(
        &self,
        exec_id: ExecutionId,
        status: ExecutionStatus,
        output: Value,
    ) -> AppResult<ExecutionRequest> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            UPDATE permission_executions
            SET
                status = $2,
                output_params = $3,
                last_updated = GREATEST(now(), last_updated),
                finished = GREATEST(now(), last_updated)
            WHERE id = $1 AND status = 'running'
            RETURNING id, username, func_name, resource_id, status, input_params,
                      output_params, created, last_updated, finished
            "#,
        )
        .bind(exec_id.as_uuid())
        .bind(status.as_str())
        .bind(output)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Storage(format!("failed to finish execution '{exec_id}': {error}"))
        })?;

        match row {
            Some(row) => row.into_request(),
            None => match self.find(exec_id).await? {
                Some(existing) => Err(AppError::Conflict(format!(
                    "illegal execution transition {} -> {}",
                    existing.status.as_str(),
                    status.as_str()
                ))),
                None => Err(AppError::NotFound(format!("execution '{exec_id}'"))),
            },
        }
    }
}

#[derive(Debug, FromRow)]
struct ExecutionRow {
    id: Uuid,
    username: String,
    func_name: String,
    resource_id: Uuid,
    status: String,
    input_params: Value,
    output_params: Value,
    created: chrono::DateTime<chrono::Utc>,
    last_updated: chrono::DateTime<chrono::Utc>,
    finished: Option<chrono::DateTime<chrono::Utc>>,
}

impl ExecutionRow {
    fn into_request(self) -> AppResult<ExecutionRequest> {
        Ok(ExecutionRequest {
            exec_id: ExecutionId::from_uuid(self.id),
            user: self.username,
            func_name: self.func_name,
            resource_id: ResourceId::from_uuid(self.resource_id),
            status: ExecutionStatus::parse(&self.status)?,
            input_params: self.input_params,
            output_params: self.output_params,
            created: self.created,
            last_updated: self.last_updated,
            finished: self.finished,
        })
    }
}

#[async_trait]
impl ExecutionRepository for PostgresExecutionRepository {
    async fn create(&self, input: CreateExecutionInput) -> AppResult<ExecutionRequest> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            INSERT INTO permission_executions (
                id, username, func_name, resource_id, status,
                input_params, output_params, created, last_updated
            )
            VALUES ($1, $2, $3, $4, 'created', $5, '{}'::JSONB, now(), now())
            RETURNING id, username, func_name, resource_id, status, input_params,
                      output_params, created, last_updated, finished
            "#,
        )
        .bind(ExecutionId::new().as_uuid())
        .bind(&input.user)
        .bind(&input.func_name)
        .bind(input.resource_id.as_uuid())
        .bind(&input.input_params)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Storage(format!("failed to create execution: {error}")))?;

        row.into_request()
    }

    async fn find(&self, exec_id: ExecutionId) -> AppResult<Option<ExecutionRequest>> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT id, username, func_name, resource_id, status, input_params,
                   output_params, created, last_updated, finished
            FROM permission_executions
            WHERE id = $1
            "#,
        )
        .bind(exec_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Storage(format!("failed to load execution '{exec_id}': {error}"))
        })?;

        row.map(ExecutionRow::into_request).transpose()
    }

    async fn list_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> AppResult<Vec<ExecutionRequest>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT id, username, func_name, resource_id, status, input_params,
                   output_params, created, last_updated, finished
            FROM permission_executions
            WHERE resource_id = $1
            ORDER BY created ASC
            "#,
        )
        .bind(resource_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Storage(format!(
                "failed to list executions of '{resource_id}': {error}"
            ))
        })?;

        rows.into_iter().map(ExecutionRow::into_request).collect()
    }

    async fn claim_next(&self, worker_id: &str) -> AppResult<Option<ExecutionRequest>> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            WITH candidate AS (
                SELECT e.id
                FROM permission_executions e
                WHERE e.status = 'created'
                  AND NOT EXISTS (
                      SELECT 1
                      FROM permission_executions running
                      WHERE running.resource_id = e.resource_id
                        AND running.status = 'running'
                  )
                  AND NOT EXISTS (
                      SELECT 1
                      FROM permission_executions older
                      WHERE older.resource_id = e.resource_id
                        AND older.status IN ('created', 'running')
                        AND (older.created, older.id) < (e.created, e.id)
                  )
                ORDER BY e.created ASC, e.id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE permission_executions e
            SET
                status = 'running',
                claimed_by = $1,
                last_updated = GREATEST(now(), e.last_updated)
            FROM candidate
            WHERE e.id = candidate.id
            RETURNING e.id, e.username, e.func_name, e.resource_id, e.status,
                      e.input_params, e.output_params, e.created, e.last_updated,
                      e.finished
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Storage(format!("failed to claim execution: {error}")))?;

        row.map(ExecutionRow::into_request).transpose()
    }

    async fn complete(&self, exec_id: ExecutionId, output: Value) -> AppResult<ExecutionRequest> {
        self.transition(exec_id, ExecutionStatus::Finished, output)
            .await
    }

    async fn fail(&self, exec_id: ExecutionId, output: Value) -> AppResult<ExecutionRequest> {
        self.transition(exec_id, ExecutionStatus::Failed, output)
            .await
    }
}

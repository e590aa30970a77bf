use async_trait::async_trait;
use chrono::Utc;
use geoperms_application::{
    CreateExecutionInput, ExecutionRepository, ExecutionRequest, ExecutionStatus,
};
use geoperms_core::{AppError, AppResult, ExecutionId, ResourceId};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;


/// In-memory execution store keeping submission order.
///
/// A single mutex over the rows gives `claim_next` its atomicity: only one
/// claimer can observe and flip a row at a time.
#[derive(Debug, Default)]
pub struct InMemoryExecutionRepository {
    rows: Mutex<Vec<ExecutionRequest>>,
}

impl InMemoryExecutionRepository {
    /// Creates an empty execution store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    async fn transition(
        &self,
        exec_id: ExecutionId,
        status: ExecutionStatus,
        output: Value,
    ) -> AppResult<ExecutionRequest> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|row| row.exec_id == exec_id)
            .ok_or_else(|| AppError::NotFound(format!("execution '{exec_id}'")))?;

        row.status.ensure_transition(status)?;
        row.status = status;
        row.output_params = output;
        let now = Utc::now().max(row.last_updated);
        row.last_updated = now;
        row.finished = status.is_terminal().then_some(now);

        Ok(row.clone())
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, input: CreateExecutionInput) -> AppResult<ExecutionRequest> {
        let now = Utc::now();
        let execution = ExecutionRequest {
            exec_id: ExecutionId::new(),
            user: input.user,
            func_name: input.func_name,
            resource_id: input.resource_id,
            status: ExecutionStatus::Created,
            input_params: input.input_params,
            output_params: json!({}),
            created: now,
            last_updated: now,
            finished: None,
        };

        self.rows.lock().await.push(execution.clone());
        Ok(execution)
    }

    async fn find(&self, exec_id: ExecutionId) -> AppResult<Option<ExecutionRequest>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|row| row.exec_id == exec_id)
            .cloned())
    }

    async fn list_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> AppResult<Vec<ExecutionRequest>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| row.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn claim_next(&self, worker_id: &str) -> AppResult<Option<ExecutionRequest>> {
        let mut rows = self.rows.lock().await;
        let running: Vec<ResourceId> = rows
            .iter()
            .filter(|row| row.status == ExecutionStatus::Running)
            .map(|row| row.resource_id)
            .collect();

        // Rows are kept in insertion order, so the first runnable row is
        // the oldest one whose resource is idle.
        let Some(row) = rows.iter_mut().find(|row| {
            row.status == ExecutionStatus::Created && !running.contains(&row.resource_id)
        }) else {
            return Ok(None);
        };

        row.status.ensure_transition(ExecutionStatus::Running)?;
        row.status = ExecutionStatus::Running;
        row.last_updated = Utc::now().max(row.last_updated);
        debug!(exec_id = %row.exec_id, worker_id, "execution claimed");

        Ok(Some(row.clone()))
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

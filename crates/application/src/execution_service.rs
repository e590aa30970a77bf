use std::sync::Arc;
use std::time::Duration;

use geoperms_core::{AppError, AppResult, ExecutionId, ResourceId};
use serde_json::json;
use tracing::{error, info};

use crate::diff_engine::compute_operations;
use crate::permission_ports::{
    AssignmentRepository, CreateExecutionInput, ExecutionRepository, ExecutionRequest,
    ReconciliationJob, ResourceRepository,
};
use crate::spec_codec::{PermissionDocument, SpecCodec};

#[cfg(test)]
mod tests;

/// Operation name recorded on reconciliation executions.
pub const RECONCILE_FUNC_NAME: &str = "permissions.apply";

/// Tracks reconciliations from acceptance to their terminal state.
///
/// Scheduling only records the job; the actual diff and apply happen when a
/// worker claims the execution. A failed apply leaves the prior assignment
/// state intact.
#[derive(Clone)]
pub struct ExecutionTracker {
    resources: Arc<dyn ResourceRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    executions: Arc<dyn ExecutionRepository>,
    codec: SpecCodec,
}

impl ExecutionTracker {
    /// Creates a tracker over the given repositories.
    #[must_use]
    pub fn new(
        resources: Arc<dyn ResourceRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        executions: Arc<dyn ExecutionRepository>,
        codec: SpecCodec,
    ) -> Self {
        Self {
            resources,
            assignments,
            executions,
            codec,
        }
    }

    /// Records a reconciliation job as a new `created` execution.
    pub async fn schedule(&self, job: ReconciliationJob) -> AppResult<ExecutionRequest> {
        let execution = self
            .executions
            .create(CreateExecutionInput {
                user: job.requester.clone(),
                func_name: RECONCILE_FUNC_NAME.to_owned(),
                resource_id: job.resource_id,
                input_params: job.to_input_params()?,
            })
            .await?;

        info!(
            exec_id = %execution.exec_id,
            resource_id = %job.resource_id,
            requester = job.requester,
            "reconciliation scheduled"
        );

        Ok(execution)
    }

    /// Returns one execution by id.
    pub async fn get_status(&self, exec_id: ExecutionId) -> AppResult<ExecutionRequest> {
        self.executions
            .find(exec_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("execution '{exec_id}'")))
    }

    /// Lists executions targeting one resource, oldest first.
    pub async fn list_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> AppResult<Vec<ExecutionRequest>> {
        self.executions.list_for_resource(resource_id).await
    }

    /// Claims and runs the oldest runnable execution.
    ///
    /// Returns `Ok(None)` when nothing is runnable. A job that fails to
    /// apply yields `Ok` with a `failed` record; `Err` is reserved for the
    /// tracking store itself failing.
    pub async fn run_next(&self, worker_id: &str) -> AppResult<Option<ExecutionRequest>> {
        let Some(execution) = self.executions.claim_next(worker_id).await? else {
            return Ok(None);
        };

        info!(
            exec_id = %execution.exec_id,
            resource_id = %execution.resource_id,
            worker_id,
            "reconciliation claimed"
        );

        let outcome = self.apply(&execution).await;
        let record = match outcome {
            Ok(document) => {
                let output = json!({ "spec": document });
                self.executions.complete(execution.exec_id, output).await?
            }
            Err(err) => {
                error!(
                    exec_id = %execution.exec_id,
                    resource_id = %execution.resource_id,
                    error = %err,
                    "reconciliation failed"
                );
                let output = json!({
                    "error": {
                        "category": error_category(&err),
                        "message": err.to_string(),
                    }
                });
                self.executions.fail(execution.exec_id, output).await?
            }
        };

        Ok(Some(record))
    }

    async fn apply(&self, execution: &ExecutionRequest) -> AppResult<PermissionDocument> {
        let job = ReconciliationJob::from_input_params(&execution.input_params)?;

        let resource = self
            .resources
            .find_resource(job.resource_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("resource '{}'", job.resource_id)))?;

        // The document was validated at acceptance; the catalog may have
        // changed since, so it is parsed again against current state.
        let spec = self.codec.parse(&resource, &job.permissions).await?;

        let current = self.assignments.list_for_resource(resource.id()).await?;
        let ops = compute_operations(&resource, &current, &spec, job.mode)?;

        if ops.is_empty() {
            info!(resource_id = %resource.id(), "reconciliation is a no-op");
        } else {
            self.assignments.apply_batch(resource.id(), &ops).await?;
            info!(
                resource_id = %resource.id(),
                operations = ops.len(),
                "reconciliation applied"
            );
        }

        let updated = self.assignments.list_for_resource(resource.id()).await?;
        self.codec.serialize(&resource, &updated).await
    }
}

fn error_category(err: &AppError) -> &'static str {
    match err {
        AppError::Validation(_) => "validation",
        AppError::UnknownSubject(_) => "unknown_subject",
        AppError::InvalidLevel(_) => "invalid_level",
        AppError::NotFound(_) => "not_found",
        AppError::Conflict(_) => "conflict",
        AppError::Unauthorized(_) => "unauthorized",
        AppError::Forbidden(_) => "forbidden",
        AppError::Storage(_) => "storage",
        AppError::Internal(_) => "internal",
    }
}

/// Polling worker draining the execution queue.
#[derive(Clone)]
pub struct ReconciliationWorker {
    tracker: ExecutionTracker,
    worker_id: String,
    poll_interval: Duration,
}

impl ReconciliationWorker {
    /// Creates a worker claiming under the given id.
    #[must_use]
    pub fn new(tracker: ExecutionTracker, worker_id: String, poll_interval: Duration) -> Self {
        Self {
            tracker,
            worker_id,
            poll_interval,
        }
    }

    /// Runs at most one execution; returns whether one was processed.
    pub async fn run_once(&self) -> AppResult<bool> {
        Ok(self.tracker.run_next(&self.worker_id).await?.is_some())
    }

    /// Drains the queue forever, sleeping between empty polls.
    pub async fn run_loop(&self) {
        info!(worker_id = self.worker_id, "reconciliation worker started");

        loop {
            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.poll_interval).await,
                Err(err) => {
                    error!(worker_id = self.worker_id, error = %err, "worker poll failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

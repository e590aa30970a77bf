use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geoperms_core::{AppError, AppResult, ExecutionId, ResourceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff_engine::ApplyMode;
use crate::spec_codec::PermissionDocument;

/// Lifecycle status of one reconciliation execution.
///
/// `created → running → {finished, failed}`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Accepted and queued, not yet picked up by a worker.
    Created,
    /// Claimed by a worker and being applied.
    Running,
    /// Applied successfully.
    Finished,
    /// Ended with an error; prior assignment state is intact.
    Failed,
}

impl ExecutionStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }

    /// Parses a storage value into a status.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown execution status '{value}'"
            ))),
        }
    }

    /// Returns whether this status admits no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Validates one status transition.
    pub fn ensure_transition(&self, next: Self) -> AppResult<()> {
        let allowed = matches!(
            (self, next),
            (Self::Created, Self::Running)
                | (Self::Running, Self::Finished)
                | (Self::Running, Self::Failed)
        );

        if !allowed {
            return Err(AppError::Conflict(format!(
                "illegal execution transition {} -> {}",
                self.as_str(),
                next.as_str()
            )));
        }

        Ok(())
    }
}

/// Trackable record of one asynchronous reconciliation.
///
/// Created when the gateway accepts a spec; mutated only by the execution
/// tracker; immutable once terminal, except for being read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Stable, externally visible execution identifier.
    pub exec_id: ExecutionId,
    /// Username of the requester.
    pub user: String,
    /// Operation recorded for observability.
    pub func_name: String,
    /// Resource the reconciliation targets.
    pub resource_id: ResourceId,
    /// Current lifecycle status.
    pub status: ExecutionStatus,
    /// Job payload captured at scheduling time.
    pub input_params: Value,
    /// Outcome payload; error details on failure, the new compact spec on
    /// success.
    pub output_params: Value,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Timestamp of the latest status transition; monotonic.
    pub last_updated: DateTime<Utc>,
    /// Completion timestamp once terminal.
    pub finished: Option<DateTime<Utc>>,
}

/// Creation payload for repository implementations.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateExecutionInput {
    /// Username of the requester.
    pub user: String,
    /// Operation recorded for observability.
    pub func_name: String,
    /// Resource the reconciliation targets.
    pub resource_id: ResourceId,
    /// Job payload to capture.
    pub input_params: Value,
}

/// Typed payload of one queued reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationJob {
    /// Resource the reconciliation targets.
    pub resource_id: ResourceId,
    /// Replace or merge semantics.
    pub mode: ApplyMode,
    /// Caller-supplied target permission document.
    pub permissions: PermissionDocument,
    /// Username of the requester.
    pub requester: String,
}

impl ReconciliationJob {
    /// Serializes the job into execution input parameters.
    pub fn to_input_params(&self) -> AppResult<Value> {
        serde_json::to_value(self)
            .map_err(|error| AppError::Internal(format!("failed to encode job payload: {error}")))
    }

    /// Restores the job from stored execution input parameters.
    pub fn from_input_params(value: &Value) -> AppResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|error| AppError::Internal(format!("failed to decode job payload: {error}")))
    }
}

/// Repository port for execution tracking.
///
/// Implementations serialize reconciliations per resource: `claim_next`
/// hands out jobs in submission order and never returns a job whose
/// resource already has a running execution.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Persists a new execution in `created` status.
    async fn create(&self, input: CreateExecutionInput) -> AppResult<ExecutionRequest>;

    /// Returns one execution by id.
    async fn find(&self, exec_id: ExecutionId) -> AppResult<Option<ExecutionRequest>>;

    /// Lists executions targeting one resource, oldest first.
    async fn list_for_resource(&self, resource_id: ResourceId)
    -> AppResult<Vec<ExecutionRequest>>;

    /// Atomically claims the oldest runnable execution, moving it to
    /// `running`. Returns `None` when nothing is runnable.
    async fn claim_next(&self, worker_id: &str) -> AppResult<Option<ExecutionRequest>>;

    /// Moves one running execution to `finished` with its outcome.
    async fn complete(&self, exec_id: ExecutionId, output: Value) -> AppResult<ExecutionRequest>;

    /// Moves one running execution to `failed` with its error payload.
    async fn fail(&self, exec_id: ExecutionId, output: Value) -> AppResult<ExecutionRequest>;
}

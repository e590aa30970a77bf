use axum::Json;
use axum::extract::{Extension, Path, State};
use geoperms_core::{CallerIdentity, ExecutionId, ResourceId};
use uuid::Uuid;

use crate::dto::ExecutionResponse;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_execution_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(exec_id): Path<Uuid>,
) -> ApiResult<Json<ExecutionResponse>> {
    let execution = state
        .gateway
        .get_execution(&caller, ExecutionId::from_uuid(exec_id))
        .await?;

    Ok(Json(ExecutionResponse::from(execution)))
}

pub async fn list_resource_executions_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(resource_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ExecutionResponse>>> {
    let executions = state
        .gateway
        .list_executions(&caller, ResourceId::from_uuid(resource_id))
        .await?
        .into_iter()
        .map(ExecutionResponse::from)
        .collect();

    Ok(Json(executions))
}

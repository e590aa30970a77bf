use axum::Json;
use axum::extract::{Extension, Path, State};
use geoperms_application::{ApplyMode, PermissionDocument};
use geoperms_core::{AppError, CallerIdentity, ResourceId};
use uuid::Uuid;

use crate::dto::{ScheduleResponse, SetPermissionsRequest};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_resource_permissions_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(resource_id): Path<Uuid>,
) -> ApiResult<Json<PermissionDocument>> {
    let document = state
        .gateway
        .get_permissions(&caller, ResourceId::from_uuid(resource_id))
        .await?;

    Ok(Json(document))
}

pub async fn replace_resource_permissions_handler(
    state: State<AppState>,
    caller: Extension<CallerIdentity>,
    resource_id: Path<Uuid>,
    request: SetPermissionsRequest,
) -> ApiResult<Json<ScheduleResponse>> {
    set_permissions(state, caller, resource_id, request, ApplyMode::Replace).await
}

pub async fn merge_resource_permissions_handler(
    state: State<AppState>,
    caller: Extension<CallerIdentity>,
    resource_id: Path<Uuid>,
    request: SetPermissionsRequest,
) -> ApiResult<Json<ScheduleResponse>> {
    set_permissions(state, caller, resource_id, request, ApplyMode::Merge).await
}

async fn set_permissions(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(resource_id): Path<Uuid>,
    request: SetPermissionsRequest,
    mode: ApplyMode,
) -> ApiResult<Json<ScheduleResponse>> {
    if let Some(uuid) = request.uuid
        && uuid != resource_id
    {
        return Err(AppError::Validation(format!(
            "body uuid '{uuid}' does not match the addressed resource '{resource_id}'"
        ))
        .into());
    }

    let receipt = state
        .gateway
        .set_permissions(
            &caller,
            ResourceId::from_uuid(resource_id),
            request.document,
            mode,
        )
        .await?;

    Ok(Json(ScheduleResponse::from(receipt)))
}

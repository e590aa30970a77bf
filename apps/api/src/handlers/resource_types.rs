use axum::Json;
use axum::extract::State;

use crate::dto::ResourceTypesResponse;
use crate::state::AppState;

pub async fn list_resource_types_handler(
    State(state): State<AppState>,
) -> Json<ResourceTypesResponse> {
    Json(ResourceTypesResponse {
        resource_types: state.gateway.resource_types(),
    })
}

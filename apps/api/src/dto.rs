use axum::extract::{Form, FromRequest, Json, Request};
use axum::http::header::CONTENT_TYPE;
use chrono::{DateTime, Utc};
use geoperms_application::{ExecutionRequest, PermissionDocument, ScheduledReconciliation};
use geoperms_core::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;

/// Health probe payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// A permission change request body.
///
/// Accepts JSON (`{"uuid": ..., "permissions": {...}}`) and form encoding
/// (`uuid=<uuid>&permissions=<json>`); legacy clients send the latter.
#[derive(Debug, PartialEq)]
pub struct SetPermissionsRequest {
    pub uuid: Option<Uuid>,
    pub document: PermissionDocument,
}

#[derive(Debug, Deserialize)]
struct JsonBody {
    #[serde(default)]
    uuid: Option<Uuid>,
    permissions: PermissionDocument,
}

#[derive(Debug, Deserialize)]
struct FormBody {
    #[serde(default)]
    uuid: Option<Uuid>,
    permissions: String,
}

impl<S> FromRequest<S> for SetPermissionsRequest
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(body) = Form::<FormBody>::from_request(request, state)
                .await
                .map_err(|error| {
                    ApiError(AppError::Validation(format!("invalid form body: {error}")))
                })?;
            let document = serde_json::from_str(&body.permissions).map_err(|error| {
                ApiError(AppError::Validation(format!(
                    "invalid permissions document: {error}"
                )))
            })?;

            return Ok(Self {
                uuid: body.uuid,
                document,
            });
        }

        let Json(body) = Json::<JsonBody>::from_request(request, state)
            .await
            .map_err(|error| {
                ApiError(AppError::Validation(format!("invalid JSON body: {error}")))
            })?;

        Ok(Self {
            uuid: body.uuid,
            document: body.permissions,
        })
    }
}

/// Receipt returned for an accepted permission change.
#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub status: String,
    pub execution_id: Uuid,
    pub status_url: String,
}

impl From<ScheduledReconciliation> for ScheduleResponse {
    fn from(value: ScheduledReconciliation) -> Self {
        Self {
            status: value.status.as_str().to_owned(),
            execution_id: value.execution_id.as_uuid(),
            status_url: value.status_url,
        }
    }
}

/// One tracked execution on the wire.
#[derive(Debug, Serialize)]
pub struct ExecutionResponse {
    pub exec_id: Uuid,
    pub user: String,
    pub func_name: String,
    pub resource_id: Uuid,
    pub status: String,
    pub input_params: Value,
    pub output_params: Value,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
}

impl From<ExecutionRequest> for ExecutionResponse {
    fn from(value: ExecutionRequest) -> Self {
        Self {
            exec_id: value.exec_id.as_uuid(),
            user: value.user,
            func_name: value.func_name,
            resource_id: value.resource_id.as_uuid(),
            status: value.status.as_str().to_owned(),
            input_params: value.input_params,
            output_params: value.output_params,
            created: value.created,
            last_updated: value.last_updated,
            finished: value.finished,
        }
    }
}

/// Capability tables for every resource type.
#[derive(Debug, Serialize)]
pub struct ResourceTypesResponse {
    pub resource_types: Vec<geoperms_application::ResourceTypeDescriptor>,
}

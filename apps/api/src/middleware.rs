use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use geoperms_core::CallerIdentity;

use crate::error::ApiResult;
use crate::state::AppState;

/// Header carrying the authenticated subject claim.
///
/// An upstream auth proxy is trusted to have verified the claim; requests
/// without it are anonymous.
pub const SUBJECT_HEADER: &str = "x-geoperms-subject";

pub async fn caller_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let claim = request
        .headers()
        .get(SUBJECT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned);

    let identity = match claim {
        Some(claim) => match state.directory.find_user_by_name(&claim).await? {
            Some(subject) => {
                CallerIdentity::authenticated(subject.name(), subject.title(), subject.is_admin())
            }
            // Carried as a claim so the gateway can answer 401 itself.
            None => CallerIdentity::authenticated(claim.clone(), claim, false),
        },
        None => CallerIdentity::anonymous(),
    };

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

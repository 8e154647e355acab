use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::workflows::tenants::{SessionRequest, SessionResponse};
use crate::workflows::Sessions;

/// POST /auth/session - Exchange a one-time secret for a session token
///
/// Expected Input:
/// ```json
/// { "identityId": "uuid", "secret": "..." }
/// ```
///
/// Expected Output:
/// ```json
/// { "success": true, "data": { "token": "jwt", "expiresAt": "...", "role": "agent", ... } }
/// ```
pub async fn open(
    State(state): State<AppState>,
    body: Result<Json<SessionRequest>, JsonRejection>,
) -> ApiResult<SessionResponse> {
    let Json(request) = body?;
    let session = Sessions::new(&state).open(request).await?;
    Ok(ApiResponse::success(session))
}

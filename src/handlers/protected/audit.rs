use axum::extract::{rejection::QueryRejection, Extension, Query, State};

use crate::audit::AuditListParams;
use crate::auth::Caller;
use crate::database::models::AuditLogEntry;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET /audit-logs?tenant=&action=&limit= - Newest first
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    params: Result<Query<AuditListParams>, QueryRejection>,
) -> ApiResult<Vec<AuditLogEntry>> {
    let Query(params) = params?;
    let entries = state.audit.list(state.store.as_ref(), &caller, params).await?;
    Ok(ApiResponse::success(entries))
}

use axum::extract::Extension;

use crate::auth::Caller;
use crate::middleware::{ApiResponse, ApiResult};
use crate::policy::{authorize, Action};

/// GET /me - The caller as resolved for this request
///
/// Expected Output:
/// ```json
/// { "success": true, "data": { "identityId": "uuid", "role": "agent", "tenantId": "uuid", "tenantActive": true } }
/// ```
pub async fn whoami(Extension(caller): Extension<Caller>) -> ApiResult<Caller> {
    authorize(&caller, Action::ViewProfile, caller.tenant_id, Some(caller.identity_id))?;
    Ok(ApiResponse::success(caller))
}

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, Path, State,
    },
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::Caller;
use crate::database::models::Tenant;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::workflows::tenants::{CreateTenantRequest, CreatedTenant, UpdateTenantRequest};
use crate::workflows::TenantAdministration;

/// POST /tenants - Onboard a university
///
/// Expected Input:
/// ```json
/// { "subdomain": "harvard", "name": "Harvard University", "plan": "growth", "adminEmail": "admissions@harvard.edu" }
/// ```
///
/// Creates the tenant, its first tenant_admin (one-time secret in the
/// response) and the default pipeline.
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<CreateTenantRequest>, JsonRejection>,
) -> ApiResult<CreatedTenant> {
    let Json(request) = body?;
    let outcome = TenantAdministration::new(&state).create(request, &caller).await?;
    Ok(ApiResponse::from_outcome(outcome, StatusCode::CREATED))
}

/// GET /tenants
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Vec<Tenant>> {
    let tenants = TenantAdministration::new(&state).list(&caller).await?;
    Ok(ApiResponse::success(tenants))
}

/// PATCH /tenants/:id - Rename or re-plan a tenant
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    tenant_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateTenantRequest>, JsonRejection>,
) -> ApiResult<Tenant> {
    let Path(tenant_id) = tenant_id?;
    let Json(request) = body?;
    let outcome = TenantAdministration::new(&state)
        .update(tenant_id, request, &caller)
        .await?;
    Ok(ApiResponse::from_outcome(outcome, StatusCode::OK))
}

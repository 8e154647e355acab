use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Extension, Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::Caller;
use crate::database::models::Lead;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::tenancy::HostScope;
use crate::workflows::assignment::{AssignLeadRequest, AssignmentResult};
use crate::workflows::leads::{ListLeadsParams, MoveStageRequest};
use crate::workflows::{LeadAssignmentWorkflow, LeadDesk};

/// GET /leads - Leads of the host tenant (agents: their own)
///
/// On the platform host an operator names the tenant with `?tenant=`.
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(scope): Extension<HostScope>,
    params: Result<Query<ListLeadsParams>, QueryRejection>,
) -> ApiResult<Vec<Lead>> {
    let Query(params) = params?;
    let tenant_id = params
        .tenant
        .or(scope.tenant_id())
        .or(caller.tenant_id)
        .ok_or_else(|| ApiError::invalid_field("tenant", "is required on the platform host"))?;
    let leads = LeadDesk::new(&state).list(tenant_id, &caller).await?;
    Ok(ApiResponse::success(leads))
}

/// GET /leads/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    lead_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Lead> {
    let Path(lead_id) = lead_id?;
    let lead = LeadDesk::new(&state).view(lead_id, &caller).await?;
    Ok(ApiResponse::success(lead))
}

/// POST /leads/:id/assign - Reassign a lead to an agent of the same tenant
///
/// Expected Input:
/// ```json
/// { "agentId": "uuid" }
/// ```
///
/// Expected Output:
/// ```json
/// { "success": true, "data": { "leadId": "uuid", "previousAgent": null, "newAgent": "uuid", "assignedAt": "..." } }
/// ```
pub async fn assign(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    lead_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<AssignLeadRequest>, JsonRejection>,
) -> ApiResult<AssignmentResult> {
    let Path(lead_id) = lead_id?;
    let Json(request) = body?;
    let outcome = LeadAssignmentWorkflow::new(&state)
        .assign(lead_id, request, &caller)
        .await?;
    Ok(ApiResponse::from_outcome(outcome, StatusCode::OK))
}

/// POST /leads/:id/stage - Move a lead to another stage of its tenant
pub async fn move_stage(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    lead_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<MoveStageRequest>, JsonRejection>,
) -> ApiResult<Lead> {
    let Path(lead_id) = lead_id?;
    let Json(request) = body?;
    let outcome = LeadDesk::new(&state).move_stage(lead_id, request, &caller).await?;
    Ok(ApiResponse::from_outcome(outcome, StatusCode::OK))
}

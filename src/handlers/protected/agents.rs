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
use crate::database::models::Agent;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::workflows::provisioning::{ProvisionAgentRequest, ProvisionedAgentResponse, UpdateAgentRequest};
use crate::workflows::AgentProvisioning;

/// POST /tenants/:id/agents - Provision an agent
///
/// Expected Input:
/// ```json
/// { "displayName": "Ana Souza", "email": "ana@harvard.edu", "phone": "+5511999990000" }
/// ```
///
/// The response carries the agent's one-time `credential.secret`. It is not
/// retrievable afterwards.
pub async fn provision(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    tenant_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ProvisionAgentRequest>, JsonRejection>,
) -> ApiResult<ProvisionedAgentResponse> {
    let Path(tenant_id) = tenant_id?;
    let Json(request) = body?;
    let outcome = AgentProvisioning::new(&state)
        .provision(tenant_id, request, &caller)
        .await?;
    Ok(ApiResponse::from_outcome(outcome, StatusCode::CREATED))
}

/// GET /tenants/:id/agents
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    tenant_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<Agent>> {
    let Path(tenant_id) = tenant_id?;
    let agents = AgentProvisioning::new(&state).list(tenant_id, &caller).await?;
    Ok(ApiResponse::success(agents))
}

/// PATCH /tenants/:id/agents/:agent_id - `{ "active": false }`
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
    body: Result<Json<UpdateAgentRequest>, JsonRejection>,
) -> ApiResult<Agent> {
    let Path((tenant_id, agent_id)) = ids?;
    let Json(request) = body?;
    let outcome = AgentProvisioning::new(&state)
        .set_active(tenant_id, agent_id, request, &caller)
        .await?;
    Ok(ApiResponse::from_outcome(outcome, StatusCode::OK))
}

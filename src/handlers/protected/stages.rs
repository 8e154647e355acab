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
use crate::database::models::PipelineStage;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::workflows::stages::ReconcileStagesRequest;
use crate::workflows::KanbanStageManager;

/// GET /tenants/:id/stages - Kanban columns in display order
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    tenant_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<PipelineStage>> {
    let Path(tenant_id) = tenant_id?;
    let stages = KanbanStageManager::new(&state).list_stages(tenant_id, &caller).await?;
    Ok(ApiResponse::success(stages))
}

/// PUT /tenants/:id/stages - Reconcile the pipeline
///
/// Expected Input:
/// ```json
/// {
///   "stages": [
///     { "id": "uuid", "name": "Contacted", "color": "#8B5CF6", "position": 1 },
///     { "name": "Interview", "color": "#0EA5E9", "position": 2 }
///   ],
///   "deletedIds": ["uuid"]
/// }
/// ```
///
/// Stages without an `id` are created. Deleting a stage that still holds
/// leads fails the whole request with 409 and changes nothing.
pub async fn reconcile(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    tenant_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ReconcileStagesRequest>, JsonRejection>,
) -> ApiResult<Vec<PipelineStage>> {
    let Path(tenant_id) = tenant_id?;
    let Json(request) = body?;
    let outcome = KanbanStageManager::new(&state)
        .reconcile(tenant_id, request, &caller)
        .await?;
    Ok(ApiResponse::from_outcome(outcome, StatusCode::OK))
}

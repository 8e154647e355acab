use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::StatusCode,
    Json,
};

use crate::database::models::Lead;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::tenancy::HostScope;
use crate::workflows::intake::LeadIntakeRequest;
use crate::workflows::LeadIntake;

/// POST /leads - Public lead capture on a tenant host
///
/// Expected Input:
/// ```json
/// { "fullName": "Maya Chen", "email": "maya@example.com", "referral": "ana-souza" }
/// ```
///
/// The lead lands on the tenant's lowest-position stage.
pub async fn submit(
    State(state): State<AppState>,
    Extension(scope): Extension<HostScope>,
    body: Result<Json<LeadIntakeRequest>, JsonRejection>,
) -> ApiResult<Lead> {
    let Json(request) = body?;
    let outcome = LeadIntake::new(&state).submit(scope, request).await?;
    Ok(ApiResponse::from_outcome(outcome, StatusCode::CREATED))
}

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::database::models::Tenant;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::workflows::tenants::BillingEvent;
use crate::workflows::TenantAdministration;

pub const BILLING_SECRET_HEADER: &str = "x-billing-secret";

/// POST /webhooks/billing - Payment provider status transition
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<BillingEvent>, JsonRejection>,
) -> ApiResult<Tenant> {
    let presented = headers.get(BILLING_SECRET_HEADER).and_then(|v| v.to_str().ok());
    let Json(event) = body?;
    let outcome = TenantAdministration::new(&state)
        .apply_billing_event(presented, event)
        .await?;
    Ok(ApiResponse::from_outcome(outcome, StatusCode::OK))
}

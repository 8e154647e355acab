use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET / - Service description
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Admissions CRM",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "public": "POST /leads, POST /auth/session, POST /webhooks/billing",
                "protected": "/me, /leads/:id, /tenants/:id/agents, /tenants/:id/stages, /audit-logs",
                "elevated": "/tenants (platform host only)",
            }
        }
    }))
}

/// GET /health - Storage health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "storage": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": {
                        "code": "INTERNAL_SERVER_ERROR",
                        "message": "storage unavailable"
                    },
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}

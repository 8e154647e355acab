use std::time::Duration;

use axum::{
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::handlers::{elevated, protected, public};
use crate::middleware::{host_scope_middleware, identity_middleware, require_platform_host};
use crate::state::AppState;

/// The whole HTTP surface.
pub fn app(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let cors = cors_layer(&state.config.security.cors_origins);

    Router::new()
        // Public, host-independent
        .route("/", get(public::system::root))
        .route("/health", get(public::system::health))
        .route("/auth/session", post(public::session::open))
        .route("/webhooks/billing", post(public::billing::receive))
        // Tenant-facing tiers
        .merge(intake_routes(&state))
        .merge(protected_routes(&state))
        .merge(elevated_routes(&state))
        .with_state(state)
        // Global middleware
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn intake_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/leads", post(public::intake::submit))
        .layer(from_fn_with_state(state.clone(), host_scope_middleware))
}

fn protected_routes(state: &AppState) -> Router<AppState> {
    use protected::{agents, audit, leads, me, stages};

    Router::new()
        .route("/me", get(me::whoami))
        .route("/leads", get(leads::list))
        .route("/leads/:id", get(leads::show))
        .route("/leads/:id/assign", post(leads::assign))
        .route("/leads/:id/stage", post(leads::move_stage))
        .route("/tenants/:id/agents", get(agents::list).post(agents::provision))
        .route("/tenants/:id/agents/:agent_id", patch(agents::update))
        .route("/tenants/:id/stages", get(stages::list).put(stages::reconcile))
        .route("/audit-logs", get(audit::list))
        // Layers run bottom-up: host scope first, then identity.
        .layer(from_fn_with_state(state.clone(), identity_middleware))
        .layer(from_fn_with_state(state.clone(), host_scope_middleware))
}

fn elevated_routes(state: &AppState) -> Router<AppState> {
    use elevated::tenants;

    Router::new()
        .route("/tenants", get(tenants::list).post(tenants::create))
        .route("/tenants/:id", patch(tenants::update))
        .layer(from_fn_with_state(state.clone(), identity_middleware))
        .layer(from_fn(require_platform_host))
        .layer(from_fn_with_state(state.clone(), host_scope_middleware))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    CorsLayer::permissive().allow_origin(AllowOrigin::list(origins))
}

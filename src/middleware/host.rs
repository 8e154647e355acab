use axum::{
    extract::{Request, State},
    http::header::HOST,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::AppState;
use crate::tenancy::HostScope;

/// Resolves the Host header into a `HostScope` extension. Unknown or
/// foreign hosts never reach a handler.
pub async fn host_scope_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().host().map(str::to_string))
        .unwrap_or_default();

    match state.resolver.resolve(&host, state.store.as_ref()).await {
        Ok(scope) => {
            request.extensions_mut().insert(scope);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!("Host '{}' did not resolve: {}", host, e);
            ApiError::from(e).into_response()
        }
    }
}

/// Rejects everything not addressed to the platform host.
pub async fn require_platform_host(request: Request, next: Next) -> Response {
    match request.extensions().get::<HostScope>() {
        Some(HostScope::Platform) => next.run(request).await,
        _ => ApiError::resource_not_found().into_response(),
    }
}

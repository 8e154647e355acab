use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{extract_bearer_token, Caller, IdentityContext};
use crate::error::ApiError;
use crate::state::AppState;
use crate::tenancy::HostScope;

/// Resolves the bearer token into a `Caller` once and caches it in the
/// request extensions. Must run after `host_scope_middleware`.
pub async fn identity_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let scope = request.extensions().get::<HostScope>().copied();
    match authenticate(&state, &headers, scope).await {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    scope: Option<HostScope>,
) -> Result<Caller, ApiError> {
    // Authenticated routes do not exist on the marketing site.
    let scope = match scope {
        Some(HostScope::Marketing) | None => return Err(ApiError::resource_not_found()),
        Some(scope) => scope,
    };

    let token = extract_token(headers).map_err(ApiError::unauthorized)?;
    let caller = IdentityContext::new(state.store.as_ref(), state.tokens.as_ref())
        .resolve(token)
        .await?;

    // A tenant host only serves its own members (and operators).
    if let HostScope::Tenant(host_tenant) = scope {
        if !caller.is_operator() && caller.tenant_id != Some(host_tenant) {
            tracing::warn!(
                "Caller {} bound to {:?} used the host of tenant {}",
                caller.identity_id,
                caller.tenant_id,
                host_tenant
            );
            return Err(ApiError::resource_not_found());
        }
    }

    Ok(caller)
}

/// Extract the bearer token from the Authorization header
fn extract_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let auth_header = headers
        .get("authorization")
        .ok_or("Missing Authorization header")?
        .to_str()
        .map_err(|_| "Invalid Authorization header format")?;
    extract_bearer_token(auth_header)
}

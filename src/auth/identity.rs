//! Per-request caller resolution.
//!
//! `IdentityContext::resolve` performs the one privileged read of a request:
//! it loads the identity, its role, its tenant binding, the tenant's status
//! and (for agents) the active flag in a single store call. It never asks the
//! policy engine anything. The resulting `Caller` is stored in the request
//! extensions and reused by every later step of the same request.

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::TokenSigner;
use crate::database::models::{Role, TenantStatus};
use crate::database::store::CrmStore;
use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub identity_id: Uuid,
    /// `None` for a stored role this build does not recognise; always denied.
    pub role: Option<Role>,
    pub tenant_id: Option<Uuid>,
    pub tenant_active: bool,
}

impl Caller {
    pub fn is_operator(&self) -> bool {
        self.role == Some(Role::PlatformOperator)
    }

    pub fn is_agent(&self) -> bool {
        self.role == Some(Role::Agent)
    }
}

pub struct IdentityContext<'a> {
    store: &'a dyn CrmStore,
    tokens: &'a TokenSigner,
}

impl<'a> IdentityContext<'a> {
    pub fn new(store: &'a dyn CrmStore, tokens: &'a TokenSigner) -> Self {
        Self { store, tokens }
    }

    /// Turns a bearer token into a `Caller`.
    pub async fn resolve(&self, token: &str) -> Result<Caller, ApiError> {
        let claims = self.tokens.verify(token).map_err(|e| {
            debug!("Rejected session token: {}", e);
            ApiError::unauthorized("Invalid or expired session")
        })?;

        let record = self
            .store
            .load_caller(claims.sub)
            .await?
            .ok_or_else(|| {
                warn!("Session for unknown identity {}", claims.sub);
                ApiError::unauthorized("Invalid or expired session")
            })?;

        if record.agent_active == Some(false) {
            warn!("Session for deactivated agent {}", record.identity_id);
            return Err(ApiError::unauthorized("Account is deactivated"));
        }

        let tenant_active = match record.tenant_status {
            Some(status) => status == TenantStatus::Active,
            // Operators carry no tenant.
            None => record.tenant_id.is_none(),
        };

        debug!(
            "Resolved caller {} role={:?} tenant={:?}",
            record.identity_id, record.role, record.tenant_id
        );

        Ok(Caller {
            identity_id: record.identity_id,
            role: record.role,
            tenant_id: record.tenant_id,
            tenant_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::models::Identity;

    #[tokio::test]
    async fn resolves_with_exactly_one_identity_read() {
        let store = MemoryStore::new();
        let operator = Identity::new(Role::PlatformOperator, None, "ops@example.edu", "d").unwrap();
        let id = operator.id;
        store.insert_identity(operator).await.unwrap();

        let signer = TokenSigner::new("secret", 1).unwrap();
        let token = signer.issue(id).unwrap().token;

        let caller = IdentityContext::new(&store, &signer).resolve(&token).await.unwrap();
        assert!(caller.is_operator());
        assert!(caller.tenant_active);
        assert_eq!(store.identity_reads(), 1);
    }

    #[tokio::test]
    async fn unknown_identity_is_unauthorized() {
        let store = MemoryStore::new();
        let signer = TokenSigner::new("secret", 1).unwrap();
        let token = signer.issue(Uuid::new_v4()).unwrap().token;

        let err = IdentityContext::new(&store, &signer).resolve(&token).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn garbage_token_never_reaches_storage() {
        let store = MemoryStore::new();
        let signer = TokenSigner::new("secret", 1).unwrap();

        let err = IdentityContext::new(&store, &signer).resolve("not-a-jwt").await.unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert_eq!(store.identity_reads(), 0);
    }
}

//! Tenant lifecycle, billing status changes, and session issuance.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::auth::{
    digest_secret, generate_secret, verify_secret, Caller, IssuedToken, OneTimeCredential, TokenSigner,
};
use crate::config::AppConfig;
use crate::database::models::{Identity, NewAuditEntry, PipelineStage, PlanTier, Role, Tenant, TenantStatus};
use crate::database::store::{CrmStore, TenantPatch};
use crate::error::ApiError;
use crate::policy::{authorize, Action};
use crate::state::AppState;
use crate::tenancy::{validate_subdomain, TenantResolver};
use crate::types::Outcome;

use super::{looks_like_email, non_blank, FieldErrors};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateTenantRequest {
    pub subdomain: String,
    pub name: String,
    #[serde(default)]
    pub plan: Option<PlanTier>,
    pub admin_email: String,
}

impl CreateTenantRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_subdomain(&self.subdomain)?;
        let mut errors = FieldErrors::default();
        errors.check(non_blank(&self.name, 120), "name", "must be 1-120 characters");
        errors.check(looks_like_email(&self.admin_email), "adminEmail", "must be an email address");
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateTenantRequest {
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub plan: Option<PlanTier>,
}

impl UpdateTenantRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.subdomain.is_none() && self.name.is_none() && self.plan.is_none() {
            return Err(ApiError::validation_error("Nothing to update", None));
        }
        if let Some(subdomain) = &self.subdomain {
            validate_subdomain(subdomain)?;
        }
        if let Some(name) = &self.name {
            if !non_blank(name, 120) {
                return Err(ApiError::invalid_field("name", "must be 1-120 characters"));
            }
        }
        Ok(())
    }
}

/// Payment-provider notification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BillingEvent {
    pub tenant_id: Uuid,
    pub status: TenantStatus,
    #[serde(default)]
    pub plan: Option<PlanTier>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTenant {
    pub tenant: Tenant,
    pub admin: OneTimeCredential,
    pub stages: Vec<PipelineStage>,
}

pub struct TenantAdministration<'a> {
    store: &'a dyn CrmStore,
    audit: &'a AuditLog,
    resolver: &'a TenantResolver,
    config: &'a AppConfig,
}

impl<'a> TenantAdministration<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store.as_ref(),
            audit: state.audit.as_ref(),
            resolver: state.resolver.as_ref(),
            config: state.config.as_ref(),
        }
    }

    /// New tenant with its first admin and the default pipeline.
    pub async fn create(
        &self,
        request: CreateTenantRequest,
        caller: &Caller,
    ) -> Result<Outcome<CreatedTenant>, ApiError> {
        authorize(caller, Action::ManageTenant, None, None)?;
        request.validate()?;

        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            subdomain: request.subdomain,
            name: request.name.trim().to_string(),
            plan: request.plan.unwrap_or(PlanTier::Starter),
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let secret = generate_secret();
        let admin = Identity::new(
            Role::TenantAdmin,
            Some(tenant.id),
            request.admin_email.trim(),
            digest_secret(&secret),
        )?;
        let admin_id = admin.id;

        let stages = self
            .store
            .create_tenant(tenant.clone(), admin, &self.config.pipeline.default_stages)
            .await?;
        info!("Created tenant {} ({})", tenant.subdomain, tenant.id);

        let audit = self
            .audit
            .record(
                self.store,
                NewAuditEntry {
                    actor_id: Some(caller.identity_id),
                    tenant_id: Some(tenant.id),
                    action: "tenant_created",
                    entity: "tenant",
                    entity_id: Some(tenant.id),
                    metadata: json!({
                        "subdomain": tenant.subdomain,
                        "plan": tenant.plan,
                        "admin_id": admin_id,
                    }),
                    occurred_at: Some(now),
                },
            )
            .await;

        Ok(Outcome::new(CreatedTenant {
            tenant,
            admin: OneTimeCredential { identity_id: admin_id, secret },
            stages,
        })
        .warn(audit.warning()))
    }

    pub async fn list(&self, caller: &Caller) -> Result<Vec<Tenant>, ApiError> {
        authorize(caller, Action::ManageTenant, None, None)?;
        Ok(self.store.list_tenants().await?)
    }

    pub async fn update(
        &self,
        tenant_id: Uuid,
        request: UpdateTenantRequest,
        caller: &Caller,
    ) -> Result<Outcome<Tenant>, ApiError> {
        authorize(caller, Action::ManageTenant, Some(tenant_id), None)?;
        request.validate()?;

        let patch = TenantPatch {
            subdomain: request.subdomain,
            name: request.name.map(|n| n.trim().to_string()),
            plan: request.plan,
            status: None,
        };
        let (before, after) = self.store.update_tenant(tenant_id, patch).await?;
        if before.subdomain != after.subdomain {
            self.resolver.invalidate_tenant(tenant_id).await;
            info!("Tenant {} renamed {} -> {}", tenant_id, before.subdomain, after.subdomain);
        }

        let audit = self
            .audit
            .record(
                self.store,
                NewAuditEntry {
                    actor_id: Some(caller.identity_id),
                    tenant_id: Some(tenant_id),
                    action: "tenant_updated",
                    entity: "tenant",
                    entity_id: Some(tenant_id),
                    metadata: json!({
                        "before": { "subdomain": before.subdomain, "name": before.name, "plan": before.plan },
                        "after": { "subdomain": after.subdomain, "name": after.name, "plan": after.plan },
                    }),
                    occurred_at: Some(after.updated_at),
                },
            )
            .await;

        Ok(Outcome::new(after).warn(audit.warning()))
    }

    /// Applies a payment-provider status transition after checking the
    /// shared secret.
    pub async fn apply_billing_event(
        &self,
        presented_secret: Option<&str>,
        event: BillingEvent,
    ) -> Result<Outcome<Tenant>, ApiError> {
        let Some(expected) = self.config.security.billing_webhook_secret.as_deref() else {
            warn!("Billing webhook called but no secret is configured");
            return Err(ApiError::unauthorized("Billing webhook is not enabled"));
        };
        let presented = presented_secret.unwrap_or_default();
        if !verify_secret(presented, &digest_secret(expected)) {
            warn!("Billing webhook rejected: bad secret");
            return Err(ApiError::unauthorized("Invalid webhook secret"));
        }

        let patch = TenantPatch {
            status: Some(event.status),
            plan: event.plan,
            ..Default::default()
        };
        let (before, after) = self.store.update_tenant(event.tenant_id, patch).await?;
        info!(
            "Tenant {} billing status {} -> {}",
            after.subdomain,
            before.status.as_str(),
            after.status.as_str()
        );

        let audit = self
            .audit
            .record(
                self.store,
                NewAuditEntry {
                    actor_id: None,
                    tenant_id: Some(after.id),
                    action: "tenant_status_changed",
                    entity: "tenant",
                    entity_id: Some(after.id),
                    metadata: json!({
                        "previous_status": before.status,
                        "new_status": after.status,
                        "previous_plan": before.plan,
                        "new_plan": after.plan,
                    }),
                    occurred_at: Some(after.updated_at),
                },
            )
            .await;

        Ok(Outcome::new(after).warn(audit.warning()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionRequest {
    pub identity_id: Uuid,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    #[serde(flatten)]
    pub token: IssuedToken,
    pub identity_id: Uuid,
    pub role: Role,
    pub tenant_id: Option<Uuid>,
}

/// Credential exchange and operator bootstrap.
pub struct Sessions<'a> {
    store: &'a dyn CrmStore,
    tokens: &'a TokenSigner,
}

impl<'a> Sessions<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store.as_ref(),
            tokens: state.tokens.as_ref(),
        }
    }

    pub fn with(store: &'a dyn CrmStore, tokens: &'a TokenSigner) -> Self {
        Self { store, tokens }
    }

    /// Exchanges a one-time secret for a session token. Every failure looks
    /// the same to the client.
    pub async fn open(&self, request: SessionRequest) -> Result<SessionResponse, ApiError> {
        let invalid = || ApiError::unauthorized("Invalid credentials");

        let identity = self.store.get_identity(request.identity_id).await?.ok_or_else(invalid)?;
        if !verify_secret(&request.secret, &identity.credential_digest) {
            warn!("Failed login for identity {}", identity.id);
            return Err(invalid());
        }
        if identity.role == Role::Agent {
            let active = self.store.get_agent(identity.id).await?.map_or(false, |a| a.active);
            if !active {
                warn!("Login refused for deactivated agent {}", identity.id);
                return Err(invalid());
            }
        }

        let token = self.tokens.issue(identity.id).map_err(|e| {
            tracing::error!("Token issuance failed: {}", e);
            ApiError::internal_server_error("Could not open a session")
        })?;
        info!("Session opened for {} ({})", identity.id, identity.role.as_str());

        Ok(SessionResponse {
            token,
            identity_id: identity.id,
            role: identity.role,
            tenant_id: identity.tenant_id,
        })
    }
}

/// Creates the first platform operator. Refused once any operator exists.
pub async fn bootstrap_operator(store: &dyn CrmStore, email: &str) -> Result<OneTimeCredential, ApiError> {
    if !looks_like_email(email) {
        return Err(ApiError::invalid_field("email", "must be an email address"));
    }
    if store.count_platform_operators().await? > 0 {
        return Err(ApiError::conflict("A platform operator already exists"));
    }

    let secret = generate_secret();
    let operator = Identity::new(Role::PlatformOperator, None, email, digest_secret(&secret))?;
    let identity_id = operator.id;
    store.insert_identity(operator).await?;
    info!("Bootstrapped platform operator {}", identity_id);

    Ok(OneTimeCredential { identity_id, secret })
}

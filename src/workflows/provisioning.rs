use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::auth::{digest_secret, generate_secret, Caller, OneTimeCredential};
use crate::config::PipelineConfig;
use crate::database::models::agent::slugify;
use crate::database::models::{Agent, Identity, NewAuditEntry, Role};
use crate::database::store::{CrmStore, NewAgent};
use crate::error::ApiError;
use crate::policy::{authorize, Action};
use crate::state::AppState;
use crate::types::Outcome;

use super::{looks_like_email, non_blank, FieldErrors};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProvisionAgentRequest {
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ProvisionAgentRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::default();
        errors.check(non_blank(&self.display_name, 120), "displayName", "must be 1-120 characters");
        errors.check(looks_like_email(&self.email), "email", "must be an email address");
        if let Some(phone) = &self.phone {
            errors.check(
                phone.starts_with('+') && phone.len() > 4 && phone[1..].chars().all(|c| c.is_ascii_digit()),
                "phone",
                "must be in +<digits> form",
            );
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateAgentRequest {
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedAgentResponse {
    pub agent: Agent,
    /// Shown once; only its digest is kept.
    pub credential: OneTimeCredential,
    pub default_stages_created: usize,
}

pub struct AgentProvisioning<'a> {
    store: &'a dyn CrmStore,
    audit: &'a AuditLog,
    pipeline: &'a PipelineConfig,
}

impl<'a> AgentProvisioning<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store.as_ref(),
            audit: state.audit.as_ref(),
            pipeline: &state.config.pipeline,
        }
    }

    /// Creates the agent's identity and profile together, seeding the
    /// default pipeline when the tenant has no stages yet.
    pub async fn provision(
        &self,
        tenant_id: Uuid,
        request: ProvisionAgentRequest,
        caller: &Caller,
    ) -> Result<Outcome<ProvisionedAgentResponse>, ApiError> {
        authorize(caller, Action::ProvisionAgent, Some(tenant_id), None)?;
        request.validate()?;

        let secret = generate_secret();
        let identity = Identity::new(
            Role::Agent,
            Some(tenant_id),
            request.email.trim(),
            digest_secret(&secret),
        )?;
        let identity_id = identity.id;

        let provisioned = self
            .store
            .provision_agent(
                identity,
                NewAgent {
                    slug_base: slugify(&request.display_name),
                    display_name: request.display_name.trim().to_string(),
                    phone: request.phone,
                },
                &self.pipeline.default_stages,
            )
            .await?;
        info!(
            "Provisioned agent {} ({}) in tenant {}",
            provisioned.agent.id, provisioned.agent.slug, tenant_id
        );

        let audit = self
            .audit
            .record(
                self.store,
                NewAuditEntry {
                    actor_id: Some(caller.identity_id),
                    tenant_id: Some(tenant_id),
                    action: "agent_created",
                    entity: "agent",
                    entity_id: Some(provisioned.agent.id),
                    metadata: json!({
                        "slug": provisioned.agent.slug,
                        "default_stages_created": provisioned.default_stages_created,
                    }),
                    occurred_at: None,
                },
            )
            .await;

        Ok(Outcome::new(ProvisionedAgentResponse {
            agent: provisioned.agent,
            credential: OneTimeCredential { identity_id, secret },
            default_stages_created: provisioned.default_stages_created,
        })
        .warn(audit.warning()))
    }

    pub async fn list(&self, tenant_id: Uuid, caller: &Caller) -> Result<Vec<Agent>, ApiError> {
        authorize(caller, Action::ListAgents, Some(tenant_id), None)?;
        Ok(self.store.list_agents(tenant_id).await?)
    }

    /// Activates or deactivates an agent. A deactivated agent's sessions stop
    /// working on their next request.
    pub async fn set_active(
        &self,
        tenant_id: Uuid,
        agent_id: Uuid,
        request: UpdateAgentRequest,
        caller: &Caller,
    ) -> Result<Outcome<Agent>, ApiError> {
        authorize(caller, Action::UpdateAgent, Some(tenant_id), None)?;

        let agent = self.store.set_agent_active(tenant_id, agent_id, request.active).await?;
        info!("Agent {} active={} by {}", agent.id, agent.active, caller.identity_id);

        let audit = self
            .audit
            .record(
                self.store,
                NewAuditEntry {
                    actor_id: Some(caller.identity_id),
                    tenant_id: Some(tenant_id),
                    action: "agent_updated",
                    entity: "agent",
                    entity_id: Some(agent.id),
                    metadata: json!({ "active": agent.active }),
                    occurred_at: None,
                },
            )
            .await;

        Ok(Outcome::new(agent).warn(audit.warning()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, email: &str, phone: Option<&str>) -> ProvisionAgentRequest {
        ProvisionAgentRequest {
            display_name: name.into(),
            email: email.into(),
            phone: phone.map(str::to_string),
        }
    }

    #[test]
    fn validation() {
        assert!(request("Ana Souza", "ana@harvard.edu", Some("+5511999990000")).validate().is_ok());
        assert!(request("", "ana@harvard.edu", None).validate().is_err());
        assert!(request("Ana", "not-an-email", None).validate().is_err());
        assert!(request("Ana", "ana@harvard.edu", Some("555-0100")).validate().is_err());
    }
}

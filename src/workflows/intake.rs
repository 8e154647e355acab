//! Public lead capture on a tenant host.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::database::models::{Lead, NewAuditEntry};
use crate::database::store::{CrmStore, NewLead, StoreError};
use crate::error::ApiError;
use crate::state::AppState;
use crate::tenancy::HostScope;
use crate::types::Outcome;

use super::{looks_like_email, non_blank, FieldErrors};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LeadIntakeRequest {
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Free-form attribution (form id, utm tags, ...). Must be an object.
    #[serde(default)]
    pub source: Option<Value>,
    #[serde(default)]
    pub score: Option<i32>,
    /// Slug of the agent whose referral link brought the lead in.
    #[serde(default)]
    pub referral: Option<String>,
}

impl LeadIntakeRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::default();
        errors.check(non_blank(&self.full_name, 200), "fullName", "must be 1-200 characters");
        if let Some(email) = &self.email {
            errors.check(looks_like_email(email), "email", "must be an email address");
        }
        errors.check(
            self.email.is_some() || self.phone.is_some(),
            "email",
            "an email or a phone number is required",
        );
        if let Some(source) = &self.source {
            errors.check(source.is_object(), "source", "must be an object");
        }
        if let Some(score) = self.score {
            errors.check((0..=100).contains(&score), "score", "must be between 0 and 100");
        }
        errors.into_result()
    }
}

pub struct LeadIntake<'a> {
    store: &'a dyn CrmStore,
    audit: &'a AuditLog,
}

impl<'a> LeadIntake<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store.as_ref(),
            audit: state.audit.as_ref(),
        }
    }

    /// Creates a lead for the host's tenant on its lowest-position stage.
    /// A referral slug naming an active agent assigns the lead to them;
    /// any other slug is ignored.
    pub async fn submit(
        &self,
        scope: HostScope,
        request: LeadIntakeRequest,
    ) -> Result<Outcome<Lead>, ApiError> {
        let tenant_id = scope.tenant_id().ok_or_else(ApiError::resource_not_found)?;
        let tenant = self
            .store
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(ApiError::resource_not_found)?;
        if !tenant.is_active() {
            return Err(ApiError::forbidden("Tenant is suspended"));
        }
        request.validate()?;

        let mut assigned_agent_id = None;
        if let Some(slug) = request.referral.as_deref() {
            match self.store.find_agent_by_slug(tenant_id, slug).await? {
                Some(agent) if agent.active => assigned_agent_id = Some(agent.id),
                _ => warn!("Ignoring unknown referral '{}' for tenant {}", slug, tenant.subdomain),
            }
        }

        let mut source = match request.source {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if let Some(slug) = request.referral {
            source.insert("referral".to_string(), Value::String(slug));
        }

        let draft = NewLead {
            tenant_id,
            assigned_agent_id,
            full_name: request.full_name.trim().to_string(),
            email: request.email,
            phone: request.phone,
            source: Value::Object(source),
            score: request.score.unwrap_or(0),
        };
        let lead = match self.store.insert_lead(draft.clone()).await {
            // The referred agent was deactivated after the slug lookup.
            Err(StoreError::Conflict(reason)) if draft.assigned_agent_id.is_some() => {
                warn!("Capturing lead unassigned for tenant {}: {}", tenant.subdomain, reason);
                self.store
                    .insert_lead(NewLead { assigned_agent_id: None, ..draft })
                    .await?
            }
            inserted => inserted?,
        };
        info!("Lead {} captured for tenant {}", lead.id, tenant.subdomain);

        let audit = self
            .audit
            .record(
                self.store,
                NewAuditEntry {
                    actor_id: None,
                    tenant_id: Some(tenant_id),
                    action: "lead_created",
                    entity: "lead",
                    entity_id: Some(lead.id),
                    metadata: json!({
                        "stage_id": lead.stage_id,
                        "assigned_agent_id": lead.assigned_agent_id,
                    }),
                    occurred_at: Some(lead.created_at),
                },
            )
            .await;

        Ok(Outcome::new(lead).warn(audit.warning()))
    }
}

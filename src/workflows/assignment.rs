use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::auth::Caller;
use crate::database::models::{Agent, Lead, NewAuditEntry};
use crate::database::store::CrmStore;
use crate::error::ApiError;
use crate::messaging::{Channel, DeliveryStatus, Messenger, OutboundMessage};
use crate::policy::{authorize, Action};
use crate::state::AppState;
use crate::types::{Outcome, Warning};

pub const NOTIFICATION_FAILED: &str = "NOTIFICATION_FAILED";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssignLeadRequest {
    pub agent_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResult {
    pub lead_id: Uuid,
    pub previous_agent: Option<Uuid>,
    pub new_agent: Uuid,
    pub assigned_at: DateTime<Utc>,
}

pub struct LeadAssignmentWorkflow<'a> {
    store: &'a dyn CrmStore,
    audit: &'a AuditLog,
    messenger: &'a dyn Messenger,
}

impl<'a> LeadAssignmentWorkflow<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store.as_ref(),
            audit: state.audit.as_ref(),
            messenger: state.messenger.as_ref(),
        }
    }

    pub async fn assign(
        &self,
        lead_id: Uuid,
        request: AssignLeadRequest,
        caller: &Caller,
    ) -> Result<Outcome<AssignmentResult>, ApiError> {
        let lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or_else(ApiError::resource_not_found)?;
        authorize(caller, Action::AssignLead, Some(lead.tenant_id), lead.assigned_agent_id)?;

        let agent = self
            .store
            .get_agent(request.agent_id)
            .await?
            .ok_or_else(ApiError::resource_not_found)?;
        if agent.tenant_id != lead.tenant_id {
            warn!(
                "Refused to assign lead {} (tenant {}) to agent {} of tenant {}",
                lead.id, lead.tenant_id, agent.id, agent.tenant_id
            );
            return Err(ApiError::forbidden("Agent belongs to a different tenant"));
        }
        if !agent.active {
            return Err(ApiError::conflict("Agent is inactive"));
        }

        let change = self.store.assign_lead(lead.id, lead.tenant_id, agent.id).await?;
        info!(
            "Lead {} assigned {:?} -> {} by {}",
            lead.id, change.previous_agent, change.new_agent, caller.identity_id
        );

        let audit = self
            .audit
            .record(
                self.store,
                NewAuditEntry {
                    actor_id: Some(caller.identity_id),
                    tenant_id: Some(lead.tenant_id),
                    action: "lead_assigned",
                    entity: "lead",
                    entity_id: Some(lead.id),
                    metadata: json!({
                        "previous_agent": change.previous_agent,
                        "new_agent": change.new_agent,
                    }),
                    occurred_at: Some(change.at),
                },
            )
            .await;

        let notice = self.notify(&agent, &lead).await;

        Ok(Outcome::new(AssignmentResult {
            lead_id: lead.id,
            previous_agent: change.previous_agent,
            new_agent: change.new_agent,
            assigned_at: change.at,
        })
        .warn(audit.warning())
        .warn(notice))
    }

    /// Tells the agent about the new lead. Never fails the assignment.
    async fn notify(&self, agent: &Agent, lead: &Lead) -> Option<Warning> {
        let recipient = agent.phone.clone()?;
        let message = OutboundMessage {
            channel: Channel::Whatsapp,
            recipient,
            content: format!("New lead assigned to you: {}", lead.full_name),
        };
        match self.messenger.send(&message).await {
            Ok(DeliveryStatus::Delivered) => None,
            Ok(DeliveryStatus::Failed) => {
                warn!("Assignment notice to agent {} was not delivered", agent.id);
                Some(Warning::new(NOTIFICATION_FAILED, "The agent could not be notified"))
            }
            Err(e) => {
                warn!("Assignment notice to agent {} failed", agent.id);
                let err = ApiError::from(e);
                Some(Warning::new(NOTIFICATION_FAILED, err.message()))
            }
        }
    }
}

use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::auth::Caller;
use crate::database::models::{Lead, NewAuditEntry};
use crate::database::store::CrmStore;
use crate::error::ApiError;
use crate::policy::{authorize, Action};
use crate::state::AppState;
use crate::types::Outcome;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListLeadsParams {
    pub tenant: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MoveStageRequest {
    pub stage_id: Uuid,
}

/// Reading leads and moving them through the pipeline.
pub struct LeadDesk<'a> {
    store: &'a dyn CrmStore,
    audit: &'a AuditLog,
}

impl<'a> LeadDesk<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store.as_ref(),
            audit: state.audit.as_ref(),
        }
    }

    /// Agents only ever see leads assigned to them.
    pub async fn list(&self, tenant_id: Uuid, caller: &Caller) -> Result<Vec<Lead>, ApiError> {
        authorize(caller, Action::ListLeads, Some(tenant_id), None)?;
        let assigned_to = caller.is_agent().then_some(caller.identity_id);
        Ok(self.store.list_leads(tenant_id, assigned_to).await?)
    }

    pub async fn view(&self, lead_id: Uuid, caller: &Caller) -> Result<Lead, ApiError> {
        let lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or_else(ApiError::resource_not_found)?;
        authorize(caller, Action::ViewLead, Some(lead.tenant_id), lead.assigned_agent_id)?;
        Ok(lead)
    }

    pub async fn move_stage(
        &self,
        lead_id: Uuid,
        request: MoveStageRequest,
        caller: &Caller,
    ) -> Result<Outcome<Lead>, ApiError> {
        let lead = self.view(lead_id, caller).await?;
        authorize(caller, Action::MoveLeadStage, Some(lead.tenant_id), lead.assigned_agent_id)?;

        let change = self
            .store
            .move_lead_stage(lead.id, lead.tenant_id, request.stage_id)
            .await?;
        info!(
            "Lead {} moved {:?} -> {} by {}",
            lead.id, change.previous_stage, change.new_stage, caller.identity_id
        );

        let audit = self
            .audit
            .record(
                self.store,
                NewAuditEntry {
                    actor_id: Some(caller.identity_id),
                    tenant_id: Some(lead.tenant_id),
                    action: "lead_stage_changed",
                    entity: "lead",
                    entity_id: Some(lead.id),
                    metadata: json!({
                        "previous_stage": change.previous_stage,
                        "new_stage": change.new_stage,
                    }),
                    occurred_at: Some(change.at),
                },
            )
            .await;

        let lead = Lead {
            stage_id: Some(change.new_stage),
            updated_at: change.at,
            ..lead
        };
        Ok(Outcome::new(lead).warn(audit.warning()))
    }
}

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::auth::Caller;
use crate::database::models::{NewAuditEntry, PipelineStage, StageDraft};
use crate::database::store::{CrmStore, StagePlan};
use crate::error::ApiError;
use crate::policy::{authorize, Action};
use crate::state::AppState;
use crate::types::Outcome;

use super::{non_blank, FieldErrors};

pub const MAX_STAGE_NAME: usize = 64;

/// Body of `PUT /tenants/:id/stages`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReconcileStagesRequest {
    pub stages: Vec<StageDraft>,
    #[serde(default)]
    pub deleted_ids: Vec<Uuid>,
}

pub fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

impl ReconcileStagesRequest {
    /// Shape checks only; ownership of the ids is checked by the store.
    pub fn validate(self) -> Result<StagePlan, ApiError> {
        let mut errors = FieldErrors::default();
        let mut upserted = HashSet::new();

        for (i, stage) in self.stages.iter().enumerate() {
            errors.check(
                non_blank(&stage.name, MAX_STAGE_NAME),
                format!("stages[{}].name", i),
                format!("must be 1-{} characters", MAX_STAGE_NAME),
            );
            errors.check(
                is_hex_color(&stage.color),
                format!("stages[{}].color", i),
                "must be a #RRGGBB color",
            );
            if let Some(id) = stage.id {
                errors.check(upserted.insert(id), format!("stages[{}].id", i), "duplicate stage id");
            }
        }

        let mut deleted = HashSet::new();
        for (i, id) in self.deleted_ids.iter().enumerate() {
            errors.check(deleted.insert(*id), format!("deletedIds[{}]", i), "duplicate stage id");
            errors.check(
                !upserted.contains(id),
                format!("deletedIds[{}]", i),
                "stage cannot be both updated and deleted",
            );
        }
        errors.into_result()?;

        let upserts = self
            .stages
            .into_iter()
            .map(|stage| StageDraft { name: stage.name.trim().to_string(), ..stage })
            .collect();
        Ok(StagePlan { upserts, deleted: self.deleted_ids })
    }
}

pub struct KanbanStageManager<'a> {
    store: &'a dyn CrmStore,
    audit: &'a AuditLog,
}

impl<'a> KanbanStageManager<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store.as_ref(),
            audit: state.audit.as_ref(),
        }
    }

    /// Stages by position, ties in insertion order.
    pub async fn list_stages(&self, tenant_id: Uuid, caller: &Caller) -> Result<Vec<PipelineStage>, ApiError> {
        authorize(caller, Action::ListStages, Some(tenant_id), None)?;
        self.store
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(ApiError::resource_not_found)?;
        Ok(self.store.list_stages(tenant_id).await?)
    }

    /// Replaces the named stages in one unit: deletes, then updates, then inserts.
    /// Refused whole when any deleted stage still holds leads.
    pub async fn reconcile(
        &self,
        tenant_id: Uuid,
        request: ReconcileStagesRequest,
        caller: &Caller,
    ) -> Result<Outcome<Vec<PipelineStage>>, ApiError> {
        authorize(caller, Action::ReconcileStages, Some(tenant_id), None)?;
        let plan = request.validate()?;

        let result = self.store.reconcile_stages(tenant_id, &plan).await?;
        info!(
            "Reconciled stages of tenant {}: {} deleted, {} updated, {} created",
            tenant_id,
            result.deleted.len(),
            result.updated.len(),
            result.created.len()
        );

        let audit = self
            .audit
            .record(
                self.store,
                NewAuditEntry {
                    actor_id: Some(caller.identity_id),
                    tenant_id: Some(tenant_id),
                    action: "stages_reconciled",
                    entity: "pipeline",
                    entity_id: Some(tenant_id),
                    metadata: json!({
                        "deleted": result.deleted,
                        "updated": result.updated,
                        "created": result.created,
                    }),
                    occurred_at: None,
                },
            )
            .await;

        Ok(Outcome::new(result.stages).warn(audit.warning()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(id: Option<Uuid>, name: &str, color: &str) -> StageDraft {
        StageDraft { id, name: name.into(), color: color.into(), position: 0 }
    }

    #[test]
    fn hex_colors() {
        assert!(is_hex_color("#3B82F6"));
        assert!(is_hex_color("#abcdef"));
        assert!(!is_hex_color("3B82F6"));
        assert!(!is_hex_color("#3B82F"));
        assert!(!is_hex_color("#GGGGGG"));
    }

    #[test]
    fn reports_every_bad_field() {
        let long = "x".repeat(MAX_STAGE_NAME + 1);
        let request = ReconcileStagesRequest {
            stages: vec![draft(None, "  ", "#000000"), draft(None, &long, "red")],
            deleted_ids: vec![],
        };
        let err = request.validate().unwrap_err();
        let json = err.to_json();
        let fields = json["error"]["field_errors"].as_object().unwrap();
        assert!(fields.contains_key("stages[0].name"));
        assert!(fields.contains_key("stages[1].name"));
        assert!(fields.contains_key("stages[1].color"));
    }

    #[test]
    fn an_id_cannot_be_upserted_and_deleted() {
        let id = Uuid::new_v4();
        let request = ReconcileStagesRequest {
            stages: vec![draft(Some(id), "Contacted", "#000000")],
            deleted_ids: vec![id],
        };
        assert_eq!(request.validate().unwrap_err().error_code(), "VALIDATION_ERROR");

        let dup = Uuid::new_v4();
        let request = ReconcileStagesRequest { stages: vec![], deleted_ids: vec![dup, dup] };
        assert!(request.validate().is_err());
    }

    #[test]
    fn names_are_trimmed() {
        let request = ReconcileStagesRequest {
            stages: vec![draft(None, "  Enrolled ", "#22C55E")],
            deleted_ids: vec![],
        };
        let plan = request.validate().unwrap();
        assert_eq!(plan.upserts[0].name, "Enrolled");
    }
}

//! Storage seam for the CRM core.
//!
//! Every method is its own unit of work: implementations open and resolve
//! their own transaction, so a dropped request future never leaves a partial
//! write behind. Methods that mutate related rows re-check tenant bindings
//! under the lock they take, callers' pre-checks notwithstanding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::{
    Agent, AuditLogEntry, Identity, Lead, PipelineStage, PlanTier, Role, StageDraft, Tenant,
    TenantStatus,
};

/// Errors from a `CrmStore`
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Result of the privileged identity read. `role` is `None` when the stored
/// role string is not one this build understands.
#[derive(Debug, Clone)]
pub struct CallerRecord {
    pub identity_id: Uuid,
    pub role: Option<Role>,
    pub tenant_id: Option<Uuid>,
    pub tenant_status: Option<TenantStatus>,
    /// `Some` only for agents.
    pub agent_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct TenantPatch {
    pub subdomain: Option<String>,
    pub name: Option<String>,
    pub plan: Option<PlanTier>,
    pub status: Option<TenantStatus>,
}

#[derive(Debug, Clone)]
pub struct NewAgent {
    pub display_name: String,
    pub slug_base: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProvisionedAgent {
    pub agent: Agent,
    pub default_stages_created: usize,
}

#[derive(Debug, Clone)]
pub struct NewLead {
    pub tenant_id: Uuid,
    pub assigned_agent_id: Option<Uuid>,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: serde_json::Value,
    pub score: i32,
}

/// What an atomic reassignment observed and wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentChange {
    pub previous_agent: Option<Uuid>,
    pub new_agent: Uuid,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageChange {
    pub previous_stage: Option<Uuid>,
    pub new_stage: Uuid,
    pub at: DateTime<Utc>,
}

/// Full desired state for a tenant's pipeline, already validated for shape.
#[derive(Debug, Clone, Default)]
pub struct StagePlan {
    pub upserts: Vec<StageDraft>,
    pub deleted: Vec<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct StageReconciliation {
    pub stages: Vec<PipelineStage>,
    pub deleted: Vec<Uuid>,
    pub updated: Vec<Uuid>,
    pub created: Vec<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub tenant_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub limit: usize,
}

#[async_trait]
pub trait CrmStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;
    /// Releases pooled connections once the server has drained.
    async fn close(&self) {}

    // Tenants
    async fn create_tenant(
        &self,
        tenant: Tenant,
        admin: Identity,
        default_stages: &[StageDraft],
    ) -> Result<Vec<PipelineStage>, StoreError>;
    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError>;
    async fn find_tenant_by_subdomain(&self, label: &str) -> Result<Option<Tenant>, StoreError>;
    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError>;
    /// Returns the tenant before and after the patch.
    async fn update_tenant(&self, id: Uuid, patch: TenantPatch) -> Result<(Tenant, Tenant), StoreError>;

    // Identities
    /// Privileged, unconditional single read of a caller's role and binding.
    async fn load_caller(&self, identity_id: Uuid) -> Result<Option<CallerRecord>, StoreError>;
    async fn get_identity(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;
    async fn insert_identity(&self, identity: Identity) -> Result<(), StoreError>;
    async fn count_platform_operators(&self) -> Result<usize, StoreError>;

    // Agents
    async fn provision_agent(
        &self,
        identity: Identity,
        agent: NewAgent,
        default_stages: &[StageDraft],
    ) -> Result<ProvisionedAgent, StoreError>;
    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError>;
    async fn find_agent_by_slug(&self, tenant_id: Uuid, slug: &str) -> Result<Option<Agent>, StoreError>;
    async fn list_agents(&self, tenant_id: Uuid) -> Result<Vec<Agent>, StoreError>;
    async fn set_agent_active(&self, tenant_id: Uuid, id: Uuid, active: bool) -> Result<Agent, StoreError>;

    // Leads
    /// Inserts the lead on the tenant's lowest-position stage, if any.
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError>;
    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError>;
    async fn list_leads(&self, tenant_id: Uuid, assigned_to: Option<Uuid>) -> Result<Vec<Lead>, StoreError>;
    /// Read-modify-write of the assignee under a per-lead lock.
    async fn assign_lead(&self, lead_id: Uuid, tenant_id: Uuid, agent_id: Uuid) -> Result<AssignmentChange, StoreError>;
    async fn move_lead_stage(&self, lead_id: Uuid, tenant_id: Uuid, stage_id: Uuid) -> Result<StageChange, StoreError>;

    // Stages
    async fn list_stages(&self, tenant_id: Uuid) -> Result<Vec<PipelineStage>, StoreError>;
    /// Guard, then delete -> update -> insert, all under a whole-tenant lock.
    async fn reconcile_stages(&self, tenant_id: Uuid, plan: &StagePlan) -> Result<StageReconciliation, StoreError>;

    // Audit
    async fn insert_audit(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;
    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError>;
}

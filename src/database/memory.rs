//! In-process `CrmStore` for development and tests.
//!
//! All state sits behind one `RwLock`; every mutation holds the write half for
//! its whole read-check-write, which gives the per-lead and per-tenant
//! serialization the Postgres store gets from row locks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use crate::database::models::agent::unique_slug;
use crate::database::models::stage::sort_stages;
use crate::database::models::{
    Agent, AuditLogEntry, Identity, Lead, PipelineStage, Role, StageDraft, Tenant,
};
use crate::database::store::{
    AssignmentChange, AuditQuery, CallerRecord, CrmStore, NewAgent, NewLead, ProvisionedAgent,
    StageChange, StagePlan, StageReconciliation, StoreError, TenantPatch,
};

#[derive(Default)]
struct MemoryState {
    tenants: HashMap<Uuid, Tenant>,
    identities: HashMap<Uuid, Identity>,
    agents: HashMap<Uuid, Agent>,
    leads: HashMap<Uuid, Lead>,
    stages: HashMap<Uuid, PipelineStage>,
    audit: Vec<AuditLogEntry>,
    next_seq: i64,
}

impl MemoryState {
    fn tenant_stages(&self, tenant_id: Uuid) -> Vec<PipelineStage> {
        let mut stages: Vec<_> = self
            .stages
            .values()
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .collect();
        sort_stages(&mut stages);
        stages
    }

    fn insert_stage(&mut self, tenant_id: Uuid, draft: &StageDraft) -> Uuid {
        self.next_seq += 1;
        let stage = PipelineStage {
            id: Uuid::new_v4(),
            tenant_id,
            name: draft.name.clone(),
            color: draft.color.clone(),
            position: draft.position,
            seq: self.next_seq,
            created_at: Utc::now(),
        };
        let id = stage.id;
        self.stages.insert(id, stage);
        id
    }

    fn owned_stage(&self, tenant_id: Uuid, id: Uuid) -> Result<&PipelineStage, StoreError> {
        self.stages
            .get(&id)
            .filter(|s| s.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("stage {}", id)))
    }
}

/// Pauses one lookup after it has read its answer.
#[derive(Debug, Clone, Default)]
pub struct LookupGate {
    /// Signalled once the held lookup has read its answer.
    pub reached: Arc<Notify>,
    /// Lets the held lookup return.
    pub release: Arc<Notify>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    identity_reads: AtomicUsize,
    failing_audit_writes: AtomicU32,
    subdomain_gate: Mutex<Option<LookupGate>>,
    slug_gate: Mutex<Option<LookupGate>>,
}

async fn pass_gate(slot: &Mutex<Option<LookupGate>>) {
    let gate = slot.lock().ok().and_then(|mut slot| slot.take());
    if let Some(gate) = gate {
        gate.reached.notify_one();
        gate.release.notified().await;
    }
}

fn arm_gate(slot: &Mutex<Option<LookupGate>>) -> LookupGate {
    let gate = LookupGate::default();
    if let Ok(mut slot) = slot.lock() {
        *slot = Some(gate.clone());
    }
    gate
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of privileged identity reads served so far.
    pub fn identity_reads(&self) -> usize {
        self.identity_reads.load(Ordering::SeqCst)
    }

    /// Makes the next `n` audit inserts fail with `Unavailable`.
    pub fn fail_next_audit_writes(&self, n: u32) {
        self.failing_audit_writes.store(n, Ordering::SeqCst);
    }

    /// Holds the next `find_tenant_by_subdomain` between its read and its return.
    pub fn hold_next_subdomain_lookup(&self) -> LookupGate {
        arm_gate(&self.subdomain_gate)
    }

    /// Same for the next `find_agent_by_slug`.
    pub fn hold_next_slug_lookup(&self) -> LookupGate {
        arm_gate(&self.slug_gate)
    }
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_tenant(
        &self,
        tenant: Tenant,
        admin: Identity,
        default_stages: &[StageDraft],
    ) -> Result<Vec<PipelineStage>, StoreError> {
        let mut state = self.state.write().await;
        if state.tenants.values().any(|t| t.subdomain == tenant.subdomain) {
            return Err(StoreError::Conflict(format!("subdomain '{}' is taken", tenant.subdomain)));
        }
        if admin.tenant_id != Some(tenant.id) {
            return Err(StoreError::Conflict("admin identity is bound to another tenant".into()));
        }

        let tenant_id = tenant.id;
        state.tenants.insert(tenant_id, tenant);
        state.identities.insert(admin.id, admin);
        for draft in default_stages {
            state.insert_stage(tenant_id, draft);
        }
        Ok(state.tenant_stages(tenant_id))
    }

    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError> {
        Ok(self.state.read().await.tenants.get(&id).cloned())
    }

    async fn find_tenant_by_subdomain(&self, label: &str) -> Result<Option<Tenant>, StoreError> {
        let found = {
            let state = self.state.read().await;
            state.tenants.values().find(|t| t.subdomain == label).cloned()
        };
        pass_gate(&self.subdomain_gate).await;
        Ok(found)
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let state = self.state.read().await;
        let mut tenants: Vec<_> = state.tenants.values().cloned().collect();
        tenants.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));
        Ok(tenants)
    }

    async fn update_tenant(&self, id: Uuid, patch: TenantPatch) -> Result<(Tenant, Tenant), StoreError> {
        let mut state = self.state.write().await;
        if let Some(subdomain) = &patch.subdomain {
            if state.tenants.values().any(|t| t.id != id && &t.subdomain == subdomain) {
                return Err(StoreError::Conflict(format!("subdomain '{}' is taken", subdomain)));
            }
        }
        let tenant = state
            .tenants
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("tenant {}", id)))?;
        let before = tenant.clone();
        if let Some(subdomain) = patch.subdomain {
            tenant.subdomain = subdomain;
        }
        if let Some(name) = patch.name {
            tenant.name = name;
        }
        if let Some(plan) = patch.plan {
            tenant.plan = plan;
        }
        if let Some(status) = patch.status {
            tenant.status = status;
        }
        tenant.updated_at = Utc::now();
        Ok((before, tenant.clone()))
    }

    async fn load_caller(&self, identity_id: Uuid) -> Result<Option<CallerRecord>, StoreError> {
        self.identity_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        let Some(identity) = state.identities.get(&identity_id) else {
            return Ok(None);
        };
        let tenant_status = identity
            .tenant_id
            .and_then(|t| state.tenants.get(&t))
            .map(|t| t.status);
        let agent_active = state.agents.get(&identity_id).map(|a| a.active);
        Ok(Some(CallerRecord {
            identity_id,
            role: Some(identity.role),
            tenant_id: identity.tenant_id,
            tenant_status,
            agent_active,
        }))
    }

    async fn get_identity(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.state.read().await.identities.get(&id).cloned())
    }

    async fn insert_identity(&self, identity: Identity) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(tenant_id) = identity.tenant_id {
            if !state.tenants.contains_key(&tenant_id) {
                return Err(StoreError::NotFound(format!("tenant {}", tenant_id)));
            }
        }
        state.identities.insert(identity.id, identity);
        Ok(())
    }

    async fn count_platform_operators(&self) -> Result<usize, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .identities
            .values()
            .filter(|i| i.role == Role::PlatformOperator)
            .count())
    }

    async fn provision_agent(
        &self,
        identity: Identity,
        agent: NewAgent,
        default_stages: &[StageDraft],
    ) -> Result<ProvisionedAgent, StoreError> {
        let tenant_id = match (identity.role, identity.tenant_id) {
            (Role::Agent, Some(tenant_id)) => tenant_id,
            _ => return Err(StoreError::Conflict("agent identity must be a tenant-bound agent".into())),
        };

        let mut state = self.state.write().await;
        if !state.tenants.contains_key(&tenant_id) {
            return Err(StoreError::NotFound(format!("tenant {}", tenant_id)));
        }

        let mut default_stages_created = 0;
        if !state.stages.values().any(|s| s.tenant_id == tenant_id) {
            for draft in default_stages {
                state.insert_stage(tenant_id, draft);
                default_stages_created += 1;
            }
        }

        let slug = {
            let taken = state
                .agents
                .values()
                .filter(|a| a.tenant_id == tenant_id)
                .map(|a| a.slug.as_str());
            unique_slug(&agent.slug_base, taken)
        };

        let record = Agent {
            id: identity.id,
            tenant_id,
            display_name: agent.display_name,
            slug,
            phone: agent.phone,
            active: true,
            created_at: Utc::now(),
        };
        state.identities.insert(identity.id, identity);
        state.agents.insert(record.id, record.clone());

        Ok(ProvisionedAgent { agent: record, default_stages_created })
    }

    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError> {
        Ok(self.state.read().await.agents.get(&id).cloned())
    }

    async fn find_agent_by_slug(&self, tenant_id: Uuid, slug: &str) -> Result<Option<Agent>, StoreError> {
        let found = {
            let state = self.state.read().await;
            state
                .agents
                .values()
                .find(|a| a.tenant_id == tenant_id && a.slug == slug)
                .cloned()
        };
        pass_gate(&self.slug_gate).await;
        Ok(found)
    }

    async fn list_agents(&self, tenant_id: Uuid) -> Result<Vec<Agent>, StoreError> {
        let state = self.state.read().await;
        let mut agents: Vec<_> = state
            .agents
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.slug.cmp(&b.slug)));
        Ok(agents)
    }

    async fn set_agent_active(&self, tenant_id: Uuid, id: Uuid, active: bool) -> Result<Agent, StoreError> {
        let mut state = self.state.write().await;
        let agent = state
            .agents
            .get_mut(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("agent {}", id)))?;
        agent.active = active;
        Ok(agent.clone())
    }

    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let mut state = self.state.write().await;
        if !state.tenants.contains_key(&lead.tenant_id) {
            return Err(StoreError::NotFound(format!("tenant {}", lead.tenant_id)));
        }
        if let Some(agent_id) = lead.assigned_agent_id {
            match state.agents.get(&agent_id) {
                Some(a) if a.tenant_id == lead.tenant_id && a.active => {}
                _ => return Err(StoreError::Conflict("referral agent is not an active agent of this tenant".into())),
            }
        }

        let stage_id = state.tenant_stages(lead.tenant_id).first().map(|s| s.id);
        let now = Utc::now();
        let record = Lead {
            id: Uuid::new_v4(),
            tenant_id: lead.tenant_id,
            assigned_agent_id: lead.assigned_agent_id,
            stage_id,
            full_name: lead.full_name,
            email: lead.email,
            phone: lead.phone,
            source: lead.source,
            score: lead.score,
            created_at: now,
            updated_at: now,
        };
        state.leads.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        Ok(self.state.read().await.leads.get(&id).cloned())
    }

    async fn list_leads(&self, tenant_id: Uuid, assigned_to: Option<Uuid>) -> Result<Vec<Lead>, StoreError> {
        let state = self.state.read().await;
        let mut leads: Vec<_> = state
            .leads
            .values()
            .filter(|l| l.tenant_id == tenant_id)
            .filter(|l| assigned_to.map_or(true, |a| l.assigned_agent_id == Some(a)))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }

    async fn assign_lead(&self, lead_id: Uuid, tenant_id: Uuid, agent_id: Uuid) -> Result<AssignmentChange, StoreError> {
        let mut state = self.state.write().await;
        match state.agents.get(&agent_id) {
            None => return Err(StoreError::NotFound(format!("agent {}", agent_id))),
            Some(a) if a.tenant_id != tenant_id => {
                return Err(StoreError::Conflict("agent belongs to another tenant".into()))
            }
            Some(a) if !a.active => return Err(StoreError::Conflict("agent is inactive".into())),
            Some(_) => {}
        }

        let lead = state
            .leads
            .get_mut(&lead_id)
            .filter(|l| l.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("lead {}", lead_id)))?;

        let at = Utc::now();
        let previous_agent = lead.assigned_agent_id.replace(agent_id);
        lead.updated_at = at;
        Ok(AssignmentChange { previous_agent, new_agent: agent_id, at })
    }

    async fn move_lead_stage(&self, lead_id: Uuid, tenant_id: Uuid, stage_id: Uuid) -> Result<StageChange, StoreError> {
        let mut state = self.state.write().await;
        state.owned_stage(tenant_id, stage_id)?;
        let lead = state
            .leads
            .get_mut(&lead_id)
            .filter(|l| l.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("lead {}", lead_id)))?;

        let at = Utc::now();
        let previous_stage = lead.stage_id.replace(stage_id);
        lead.updated_at = at;
        Ok(StageChange { previous_stage, new_stage: stage_id, at })
    }

    async fn list_stages(&self, tenant_id: Uuid) -> Result<Vec<PipelineStage>, StoreError> {
        Ok(self.state.read().await.tenant_stages(tenant_id))
    }

    async fn reconcile_stages(&self, tenant_id: Uuid, plan: &StagePlan) -> Result<StageReconciliation, StoreError> {
        let mut state = self.state.write().await;
        if !state.tenants.contains_key(&tenant_id) {
            return Err(StoreError::NotFound(format!("tenant {}", tenant_id)));
        }
        for id in plan.deleted.iter().chain(plan.upserts.iter().filter_map(|d| d.id.as_ref())) {
            state.owned_stage(tenant_id, *id)?;
        }

        let referencing = state
            .leads
            .values()
            .filter(|l| l.stage_id.map_or(false, |s| plan.deleted.contains(&s)))
            .count();
        if referencing > 0 {
            return Err(StoreError::Conflict(format!(
                "{} lead(s) still reference the stages being deleted",
                referencing
            )));
        }

        let mut outcome = StageReconciliation::default();
        for id in &plan.deleted {
            state.stages.remove(id);
            outcome.deleted.push(*id);
        }
        for draft in &plan.upserts {
            let Some(id) = draft.id else { continue };
            if let Some(stage) = state.stages.get_mut(&id) {
                stage.name = draft.name.clone();
                stage.color = draft.color.clone();
                stage.position = draft.position;
                outcome.updated.push(id);
            }
        }
        for draft in plan.upserts.iter().filter(|d| d.id.is_none()) {
            let id = state.insert_stage(tenant_id, draft);
            outcome.created.push(id);
        }

        outcome.stages = state.tenant_stages(tenant_id);
        Ok(outcome)
    }

    async fn insert_audit(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        let injected = self
            .failing_audit_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("audit sink rejected the write".into()));
        }
        self.state.write().await.audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .audit
            .iter()
            .filter(|e| query.tenant_id.map_or(true, |t| e.tenant_id == Some(t)))
            .filter(|e| query.actor_id.map_or(true, |a| e.actor_id == Some(a)))
            .filter(|e| query.action.as_deref().map_or(true, |a| e.action == a))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(query.limit);
        Ok(entries)
    }
}

//! Postgres-backed `CrmStore`.
//!
//! Expected tables: `tenants`, `identities`, `agents`, `pipeline_stages`
//! (`seq BIGSERIAL`, `UNIQUE (tenant_id, id)`), `leads` (composite foreign
//! keys `(tenant_id, stage_id)` and `(tenant_id, assigned_agent_id)`, both
//! `ON DELETE RESTRICT`) and `audit_logs`. The pool's role must bypass row
//! level security: tenant scoping is decided by the policy engine, not by
//! database policies.
//!
//! Locking: lead writes lock the lead row `FOR UPDATE`; stage reconciles lock
//! the tenant row `FOR UPDATE`; lead inserts and stage moves take the tenant
//! row `FOR SHARE` so they cannot interleave with a reconcile.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, FromRow, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;
use tracing::info;

use crate::database::models::agent::unique_slug;
use crate::database::models::{
    Agent, AuditLogEntry, Identity, Lead, PipelineStage, PlanTier, Role, StageDraft, Tenant,
    TenantStatus,
};
use crate::database::store::{
    AssignmentChange, AuditQuery, CallerRecord, CrmStore, NewAgent, NewLead, ProvisionedAgent,
    StageChange, StagePlan, StageReconciliation, StoreError, TenantPatch,
};

const TENANT_COLUMNS: &str = "id, subdomain, name, plan, status, created_at, updated_at";
const IDENTITY_COLUMNS: &str = "id, role, tenant_id, email, credential_digest, created_at";
const AGENT_COLUMNS: &str = "id, tenant_id, display_name, slug, phone, active, created_at";
const LEAD_COLUMNS: &str = "id, tenant_id, assigned_agent_id, stage_id, full_name, email, phone, source, score, created_at, updated_at";
const STAGE_COLUMNS: &str = "id, tenant_id, name, color, position, seq, created_at";
const AUDIT_COLUMNS: &str = "id, actor_id, tenant_id, action, entity, entity_id, metadata, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn tenant_from_row(row: &PgRow) -> Result<Tenant, StoreError> {
    let plan: String = row.try_get("plan")?;
    let status: String = row.try_get("status")?;
    Ok(Tenant {
        id: row.try_get("id")?,
        subdomain: row.try_get("subdomain")?,
        name: row.try_get("name")?,
        plan: PlanTier::parse(&plan).ok_or_else(|| StoreError::CorruptRow(format!("plan '{}'", plan)))?,
        status: TenantStatus::parse(&status)
            .ok_or_else(|| StoreError::CorruptRow(format!("tenant status '{}'", status)))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn identity_from_row(row: &PgRow) -> Result<Identity, StoreError> {
    let role: String = row.try_get("role")?;
    Ok(Identity {
        id: row.try_get("id")?,
        role: Role::parse(&role).ok_or_else(|| StoreError::CorruptRow(format!("role '{}'", role)))?,
        tenant_id: row.try_get("tenant_id")?,
        email: row.try_get("email")?,
        credential_digest: row.try_get("credential_digest")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Unique-constraint violations become `Conflict`; everything else stays opaque.
fn conflict_on_unique(err: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Conflict(format!("{} already exists", what));
        }
        if db.is_foreign_key_violation() {
            return StoreError::Conflict(format!("{} references a row that is gone", what));
        }
    }
    StoreError::Sqlx(err)
}

async fn insert_stage(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    draft: &StageDraft,
) -> Result<Uuid, StoreError> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO pipeline_stages (id, tenant_id, name, color, position, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(tenant_id)
    .bind(&draft.name)
    .bind(&draft.color)
    .bind(draft.position)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(id)
}

async fn lock_tenant(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    mode: &'static str,
) -> Result<(), StoreError> {
    let sql = format!("SELECT id FROM tenants WHERE id = $1 {}", mode);
    sqlx::query(&sql)
        .bind(tenant_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("tenant {}", tenant_id)))?;
    Ok(())
}

async fn sorted_stages(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
) -> Result<Vec<PipelineStage>, StoreError> {
    let sql = format!(
        "SELECT {} FROM pipeline_stages WHERE tenant_id = $1 ORDER BY position ASC, seq ASC",
        STAGE_COLUMNS
    );
    Ok(sqlx::query_as::<_, PipelineStage>(&sql)
        .bind(tenant_id)
        .fetch_all(&mut **tx)
        .await?)
}

#[async_trait]
impl CrmStore for PgStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }

    async fn create_tenant(
        &self,
        tenant: Tenant,
        admin: Identity,
        default_stages: &[StageDraft],
    ) -> Result<Vec<PipelineStage>, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO tenants (id, subdomain, name, plan, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(tenant.id)
        .bind(&tenant.subdomain)
        .bind(&tenant.name)
        .bind(tenant.plan.as_str())
        .bind(tenant.status.as_str())
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "tenant subdomain"))?;

        sqlx::query(
            "INSERT INTO identities (id, role, tenant_id, email, credential_digest, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(admin.id)
        .bind(admin.role.as_str())
        .bind(admin.tenant_id)
        .bind(&admin.email)
        .bind(&admin.credential_digest)
        .bind(admin.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "identity"))?;

        for draft in default_stages {
            insert_stage(&mut tx, tenant.id, draft).await?;
        }
        let stages = sorted_stages(&mut tx, tenant.id).await?;

        tx.commit().await?;
        Ok(stages)
    }

    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError> {
        let sql = format!("SELECT {} FROM tenants WHERE id = $1", TENANT_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(tenant_from_row)
            .transpose()
    }

    async fn find_tenant_by_subdomain(&self, label: &str) -> Result<Option<Tenant>, StoreError> {
        let sql = format!("SELECT {} FROM tenants WHERE subdomain = $1", TENANT_COLUMNS);
        sqlx::query(&sql)
            .bind(label)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(tenant_from_row)
            .transpose()
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let sql = format!("SELECT {} FROM tenants ORDER BY subdomain", TENANT_COLUMNS);
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(tenant_from_row)
            .collect()
    }

    async fn update_tenant(&self, id: Uuid, patch: TenantPatch) -> Result<(Tenant, Tenant), StoreError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {} FROM tenants WHERE id = $1 FOR UPDATE", TENANT_COLUMNS);
        let before = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(tenant_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(format!("tenant {}", id)))?;

        let mut after = before.clone();
        if let Some(subdomain) = patch.subdomain {
            after.subdomain = subdomain;
        }
        if let Some(name) = patch.name {
            after.name = name;
        }
        if let Some(plan) = patch.plan {
            after.plan = plan;
        }
        if let Some(status) = patch.status {
            after.status = status;
        }
        after.updated_at = Utc::now();

        sqlx::query(
            "UPDATE tenants SET subdomain = $2, name = $3, plan = $4, status = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(id)
        .bind(&after.subdomain)
        .bind(&after.name)
        .bind(after.plan.as_str())
        .bind(after.status.as_str())
        .bind(after.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "tenant subdomain"))?;

        tx.commit().await?;
        Ok((before, after))
    }

    async fn load_caller(&self, identity_id: Uuid) -> Result<Option<CallerRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT i.id, i.role, i.tenant_id, t.status AS tenant_status, a.active AS agent_active
            FROM identities i
            LEFT JOIN tenants t ON t.id = i.tenant_id
            LEFT JOIN agents a ON a.id = i.id
            WHERE i.id = $1
            "#,
        )
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let role: String = row.try_get("role")?;
        let tenant_status: Option<String> = row.try_get("tenant_status")?;
        Ok(Some(CallerRecord {
            identity_id: row.try_get("id")?,
            role: Role::parse(&role),
            tenant_id: row.try_get("tenant_id")?,
            tenant_status: tenant_status.as_deref().and_then(TenantStatus::parse),
            agent_active: row.try_get("agent_active")?,
        }))
    }

    async fn get_identity(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {} FROM identities WHERE id = $1", IDENTITY_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(identity_from_row)
            .transpose()
    }

    async fn insert_identity(&self, identity: Identity) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO identities (id, role, tenant_id, email, credential_digest, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(identity.id)
        .bind(identity.role.as_str())
        .bind(identity.tenant_id)
        .bind(&identity.email)
        .bind(&identity.credential_digest)
        .bind(identity.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "identity"))?;
        Ok(())
    }

    async fn count_platform_operators(&self) -> Result<usize, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM identities WHERE role = 'platform_operator'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0.max(0) as usize)
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

        let mut tx = self.pool.begin().await?;
        lock_tenant(&mut tx, tenant_id, "FOR UPDATE").await?;

        let existing: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pipeline_stages WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(&mut *tx)
            .await?;
        let mut default_stages_created = 0;
        if existing.0 == 0 {
            for draft in default_stages {
                insert_stage(&mut tx, tenant_id, draft).await?;
                default_stages_created += 1;
            }
        }

        let taken: Vec<String> = sqlx::query_scalar(
            "SELECT slug FROM agents WHERE tenant_id = $1 AND (slug = $2 OR slug LIKE $2 || '-%')",
        )
        .bind(tenant_id)
        .bind(&agent.slug_base)
        .fetch_all(&mut *tx)
        .await?;
        let slug = unique_slug(&agent.slug_base, taken.iter().map(String::as_str));

        sqlx::query(
            "INSERT INTO identities (id, role, tenant_id, email, credential_digest, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(identity.id)
        .bind(identity.role.as_str())
        .bind(identity.tenant_id)
        .bind(&identity.email)
        .bind(&identity.credential_digest)
        .bind(identity.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "identity"))?;

        let sql = format!(
            "INSERT INTO agents (id, tenant_id, display_name, slug, phone, active, created_at) VALUES ($1, $2, $3, $4, $5, true, $6) RETURNING {}",
            AGENT_COLUMNS
        );
        let record = sqlx::query_as::<_, Agent>(&sql)
            .bind(identity.id)
            .bind(tenant_id)
            .bind(&agent.display_name)
            .bind(&slug)
            .bind(&agent.phone)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, "agent slug"))?;

        tx.commit().await?;
        Ok(ProvisionedAgent { agent: record, default_stages_created })
    }

    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError> {
        let sql = format!("SELECT {} FROM agents WHERE id = $1", AGENT_COLUMNS);
        Ok(sqlx::query_as::<_, Agent>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn find_agent_by_slug(&self, tenant_id: Uuid, slug: &str) -> Result<Option<Agent>, StoreError> {
        let sql = format!("SELECT {} FROM agents WHERE tenant_id = $1 AND slug = $2", AGENT_COLUMNS);
        Ok(sqlx::query_as::<_, Agent>(&sql)
            .bind(tenant_id)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_agents(&self, tenant_id: Uuid) -> Result<Vec<Agent>, StoreError> {
        let sql = format!(
            "SELECT {} FROM agents WHERE tenant_id = $1 ORDER BY created_at, slug",
            AGENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Agent>(&sql).bind(tenant_id).fetch_all(&self.pool).await?)
    }

    async fn set_agent_active(&self, tenant_id: Uuid, id: Uuid, active: bool) -> Result<Agent, StoreError> {
        let sql = format!(
            "UPDATE agents SET active = $3 WHERE id = $1 AND tenant_id = $2 RETURNING {}",
            AGENT_COLUMNS
        );
        sqlx::query_as::<_, Agent>(&sql)
            .bind(id)
            .bind(tenant_id)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("agent {}", id)))
    }

    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_tenant(&mut tx, lead.tenant_id, "FOR SHARE").await?;

        if let Some(agent_id) = lead.assigned_agent_id {
            let row = sqlx::query("SELECT tenant_id, active FROM agents WHERE id = $1 FOR SHARE")
                .bind(agent_id)
                .fetch_optional(&mut *tx)
                .await?;
            let usable = match &row {
                Some(r) => r.try_get::<Uuid, _>("tenant_id")? == lead.tenant_id && r.try_get::<bool, _>("active")?,
                None => false,
            };
            if !usable {
                return Err(StoreError::Conflict("referral agent is not an active agent of this tenant".into()));
            }
        }

        let stage_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM pipeline_stages WHERE tenant_id = $1 ORDER BY position ASC, seq ASC LIMIT 1",
        )
        .bind(lead.tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let now = Utc::now();
        let sql = format!(
            "INSERT INTO leads ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10) RETURNING {cols}",
            cols = LEAD_COLUMNS
        );
        let record = sqlx::query_as::<_, Lead>(&sql)
            .bind(Uuid::new_v4())
            .bind(lead.tenant_id)
            .bind(lead.assigned_agent_id)
            .bind(stage_id)
            .bind(&lead.full_name)
            .bind(&lead.email)
            .bind(&lead.phone)
            .bind(&lead.source)
            .bind(lead.score)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, "lead"))?;

        tx.commit().await?;
        Ok(record)
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        let sql = format!("SELECT {} FROM leads WHERE id = $1", LEAD_COLUMNS);
        Ok(sqlx::query_as::<_, Lead>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_leads(&self, tenant_id: Uuid, assigned_to: Option<Uuid>) -> Result<Vec<Lead>, StoreError> {
        let sql = format!(
            "SELECT {} FROM leads WHERE tenant_id = $1 AND ($2::uuid IS NULL OR assigned_agent_id = $2) ORDER BY created_at DESC",
            LEAD_COLUMNS
        );
        Ok(sqlx::query_as::<_, Lead>(&sql)
            .bind(tenant_id)
            .bind(assigned_to)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn assign_lead(&self, lead_id: Uuid, tenant_id: Uuid, agent_id: Uuid) -> Result<AssignmentChange, StoreError> {
        let mut tx = self.pool.begin().await?;

        let lead = sqlx::query("SELECT tenant_id, assigned_agent_id FROM leads WHERE id = $1 FOR UPDATE")
            .bind(lead_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("lead {}", lead_id)))?;
        if lead.try_get::<Uuid, _>("tenant_id")? != tenant_id {
            return Err(StoreError::NotFound(format!("lead {}", lead_id)));
        }
        let previous_agent: Option<Uuid> = lead.try_get("assigned_agent_id")?;

        let agent = sqlx::query("SELECT tenant_id, active FROM agents WHERE id = $1 FOR SHARE")
            .bind(agent_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("agent {}", agent_id)))?;
        if agent.try_get::<Uuid, _>("tenant_id")? != tenant_id {
            return Err(StoreError::Conflict("agent belongs to another tenant".into()));
        }
        if !agent.try_get::<bool, _>("active")? {
            return Err(StoreError::Conflict("agent is inactive".into()));
        }

        let at = Utc::now();
        sqlx::query("UPDATE leads SET assigned_agent_id = $2, updated_at = $3 WHERE id = $1")
            .bind(lead_id)
            .bind(agent_id)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(AssignmentChange { previous_agent, new_agent: agent_id, at })
    }

    async fn move_lead_stage(&self, lead_id: Uuid, tenant_id: Uuid, stage_id: Uuid) -> Result<StageChange, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_tenant(&mut tx, tenant_id, "FOR SHARE").await?;

        let stage_tenant: Option<Uuid> = sqlx::query_scalar("SELECT tenant_id FROM pipeline_stages WHERE id = $1")
            .bind(stage_id)
            .fetch_optional(&mut *tx)
            .await?;
        if stage_tenant != Some(tenant_id) {
            return Err(StoreError::NotFound(format!("stage {}", stage_id)));
        }

        let lead = sqlx::query("SELECT tenant_id, stage_id FROM leads WHERE id = $1 FOR UPDATE")
            .bind(lead_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("lead {}", lead_id)))?;
        if lead.try_get::<Uuid, _>("tenant_id")? != tenant_id {
            return Err(StoreError::NotFound(format!("lead {}", lead_id)));
        }
        let previous_stage: Option<Uuid> = lead.try_get("stage_id")?;

        let at = Utc::now();
        sqlx::query("UPDATE leads SET stage_id = $2, updated_at = $3 WHERE id = $1")
            .bind(lead_id)
            .bind(stage_id)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(StageChange { previous_stage, new_stage: stage_id, at })
    }

    async fn list_stages(&self, tenant_id: Uuid) -> Result<Vec<PipelineStage>, StoreError> {
        let sql = format!(
            "SELECT {} FROM pipeline_stages WHERE tenant_id = $1 ORDER BY position ASC, seq ASC",
            STAGE_COLUMNS
        );
        Ok(sqlx::query_as::<_, PipelineStage>(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn reconcile_stages(&self, tenant_id: Uuid, plan: &StagePlan) -> Result<StageReconciliation, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_tenant(&mut tx, tenant_id, "FOR UPDATE").await?;

        let owned: HashSet<Uuid> = sqlx::query_scalar("SELECT id FROM pipeline_stages WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();
        for id in plan.deleted.iter().chain(plan.upserts.iter().filter_map(|d| d.id.as_ref())) {
            if !owned.contains(id) {
                return Err(StoreError::NotFound(format!("stage {}", id)));
            }
        }

        if !plan.deleted.is_empty() {
            let referencing: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM leads WHERE tenant_id = $1 AND stage_id = ANY($2)",
            )
            .bind(tenant_id)
            .bind(&plan.deleted)
            .fetch_one(&mut *tx)
            .await?;
            if referencing.0 > 0 {
                return Err(StoreError::Conflict(format!(
                    "{} lead(s) still reference the stages being deleted",
                    referencing.0
                )));
            }

            sqlx::query("DELETE FROM pipeline_stages WHERE tenant_id = $1 AND id = ANY($2)")
                .bind(tenant_id)
                .bind(&plan.deleted)
                .execute(&mut *tx)
                .await
                .map_err(|e| conflict_on_unique(e, "stage"))?;
        }

        let mut outcome = StageReconciliation {
            deleted: plan.deleted.clone(),
            ..Default::default()
        };
        for draft in &plan.upserts {
            let Some(id) = draft.id else { continue };
            sqlx::query("UPDATE pipeline_stages SET name = $3, color = $4, position = $5 WHERE id = $1 AND tenant_id = $2")
                .bind(id)
                .bind(tenant_id)
                .bind(&draft.name)
                .bind(&draft.color)
                .bind(draft.position)
                .execute(&mut *tx)
                .await?;
            outcome.updated.push(id);
        }
        for draft in plan.upserts.iter().filter(|d| d.id.is_none()) {
            outcome.created.push(insert_stage(&mut tx, tenant_id, draft).await?);
        }

        outcome.stages = sorted_stages(&mut tx, tenant_id).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn insert_audit(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO audit_logs (id, actor_id, tenant_id, action, entity, entity_id, metadata, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id)
        .bind(entry.actor_id)
        .bind(entry.tenant_id)
        .bind(&entry.action)
        .bind(&entry.entity)
        .bind(entry.entity_id)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM audit_logs
            WHERE ($1::uuid IS NULL OR tenant_id = $1)
              AND ($2::uuid IS NULL OR actor_id = $2)
              AND ($3::text IS NULL OR action = $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#,
            AUDIT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(query.tenant_id)
            .bind(query.actor_id)
            .bind(&query.action)
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| AuditLogEntry::from_row(row).map_err(StoreError::from))
            .collect()
    }
}

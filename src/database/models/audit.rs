use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Immutable audit fact, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub action: &'static str,
    pub entity: &'static str,
    pub entity_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    /// When the recorded change happened; defaults to the write time.
    pub occurred_at: Option<DateTime<Utc>>,
}

impl NewAuditEntry {
    pub fn into_entry(self) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            actor_id: self.actor_id,
            tenant_id: self.tenant_id,
            action: self.action.to_string(),
            entity: self.entity.to_string(),
            entity_id: self.entity_id,
            metadata: self.metadata,
            created_at: self.occurred_at.unwrap_or_else(Utc::now),
        }
    }
}

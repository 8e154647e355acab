//! Append-only audit trail.
//!
//! `record` runs after the primary mutation has committed. A failed write is
//! retried a bounded number of times; if it still fails the mutation stands
//! and the caller gets an `AuditOutcome::Degraded` to surface as a warning.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::auth::Caller;
use crate::config::AuditConfig;
use crate::database::models::{AuditLogEntry, NewAuditEntry};
use crate::database::store::{AuditQuery, CrmStore};
use crate::error::ApiError;
use crate::policy::{authorize, Action};
use crate::types::Warning;

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 500;

pub const AUDIT_DEGRADED: &str = "AUDIT_DEGRADED";

#[derive(Debug, Clone)]
pub enum AuditOutcome {
    Recorded(AuditLogEntry),
    Degraded(Warning),
}

impl AuditOutcome {
    pub fn warning(self) -> Option<Warning> {
        match self {
            AuditOutcome::Recorded(_) => None,
            AuditOutcome::Degraded(warning) => Some(warning),
        }
    }
}

/// Query string of `GET /audit-logs`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditListParams {
    pub tenant: Option<Uuid>,
    pub action: Option<String>,
    pub limit: Option<usize>,
}

pub struct AuditLog {
    max_attempts: u32,
    backoff: Duration,
}

impl AuditLog {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    pub async fn record(&self, store: &dyn CrmStore, entry: NewAuditEntry) -> AuditOutcome {
        let entry = entry.into_entry();
        let mut attempt = 1;
        loop {
            match store.insert_audit(&entry).await {
                Ok(()) => {
                    debug!("Audit {} {} {:?}", entry.action, entry.entity, entry.entity_id);
                    return AuditOutcome::Recorded(entry);
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "Audit write for {} failed (attempt {}/{}): {}",
                        entry.action, attempt, self.max_attempts, e
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Audit write for {} on {:?} abandoned after {} attempts: {}",
                        entry.action, entry.entity_id, attempt, e
                    );
                    return AuditOutcome::Degraded(Warning::new(
                        AUDIT_DEGRADED,
                        format!("The change was saved but its '{}' audit entry could not be recorded", entry.action),
                    ));
                }
            }
        }
    }

    /// Entries visible to `caller`, newest first.
    ///
    /// Operators may read any tenant or all of them; admins read their own
    /// tenant; agents read only entries they authored.
    pub async fn list(
        &self,
        store: &dyn CrmStore,
        caller: &Caller,
        params: AuditListParams,
    ) -> Result<Vec<AuditLogEntry>, ApiError> {
        let tenant_id = params.tenant.or(caller.tenant_id);
        authorize(caller, Action::ReadAuditLog, tenant_id, None)?;

        let limit = match params.limit {
            Some(0) => return Err(ApiError::invalid_field("limit", "must be at least 1")),
            Some(n) => n.min(MAX_LIST_LIMIT),
            None => DEFAULT_LIST_LIMIT,
        };

        let query = AuditQuery {
            tenant_id,
            actor_id: caller.is_agent().then_some(caller.identity_id),
            action: params.action,
            limit,
        };
        Ok(store.list_audit(&query).await?)
    }
}

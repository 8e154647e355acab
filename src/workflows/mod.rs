//! Request-scoped operations. Each workflow borrows what it needs from
//! `AppState`, authorizes through `policy`, performs one store unit of work
//! and records one audit entry.

pub mod assignment;
pub mod intake;
pub mod leads;
pub mod provisioning;
pub mod stages;
pub mod tenants;

pub use assignment::LeadAssignmentWorkflow;
pub use intake::LeadIntake;
pub use leads::LeadDesk;
pub use provisioning::AgentProvisioning;
pub use stages::KanbanStageManager;
pub use tenants::{Sessions, TenantAdministration};

use std::collections::HashMap;

use crate::error::ApiError;

/// Collects per-field problems so a request reports all of them at once.
#[derive(Debug, Default)]
pub(crate) struct FieldErrors(HashMap<String, String>);

impl FieldErrors {
    pub fn add(&mut self, field: impl Into<String>, problem: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| problem.into());
    }

    pub fn check(&mut self, ok: bool, field: impl Into<String>, problem: impl Into<String>) {
        if !ok {
            self.add(field, problem);
        }
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_error("Invalid request", Some(self.0)))
        }
    }
}

pub(crate) fn non_blank(value: &str, max_len: usize) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= max_len
}

pub(crate) fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !value.contains(char::is_whitespace),
        None => false,
    }
}

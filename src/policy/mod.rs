//! Authorization decisions.
//!
//! `decide` is the only place that answers "may this caller do this". It is a
//! pure function of the resolved caller and the resource's tenant and owner;
//! every route and workflow goes through it.

use tracing::warn;
use uuid::Uuid;

use crate::auth::Caller;
use crate::database::models::Role;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ProvisionAgent,
    UpdateAgent,
    ListAgents,
    ViewLead,
    ListLeads,
    AssignLead,
    MoveLeadStage,
    ListStages,
    ReconcileStages,
    ReadAuditLog,
    ViewProfile,
    ManageTenant,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ProvisionAgent => "provision_agent",
            Action::UpdateAgent => "update_agent",
            Action::ListAgents => "list_agents",
            Action::ViewLead => "view_lead",
            Action::ListLeads => "list_leads",
            Action::AssignLead => "assign_lead",
            Action::MoveLeadStage => "move_lead_stage",
            Action::ListStages => "list_stages",
            Action::ReconcileStages => "reconcile_stages",
            Action::ReadAuditLog => "read_audit_log",
            Action::ViewProfile => "view_profile",
            Action::ManageTenant => "manage_tenant",
        }
    }

    /// Agents may perform these on their own tenant without owning the resource.
    pub fn is_self_scoped(&self) -> bool {
        matches!(
            self,
            Action::ViewProfile
                | Action::ReadAuditLog
                | Action::ListLeads
                | Action::ListStages
                | Action::ListAgents
        )
    }

    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Action::ProvisionAgent | Action::UpdateAgent | Action::AssignLead | Action::ReconcileStages
        )
    }

    pub fn is_platform_only(&self) -> bool {
        matches!(self, Action::ManageTenant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    /// Cross-tenant or not-owned; reported exactly like a missing resource.
    OutOfScope,
    InsufficientRole,
    TenantSuspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl From<DenyReason> for ApiError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::Unauthenticated => ApiError::unauthorized("Authentication required"),
            DenyReason::OutOfScope => ApiError::resource_not_found(),
            DenyReason::InsufficientRole => ApiError::forbidden("Insufficient permissions"),
            DenyReason::TenantSuspended => ApiError::forbidden("Tenant is suspended"),
        }
    }
}

/// Deny-by-default decision.
///
/// `resource_tenant` is `None` for platform-wide resources (the tenant list,
/// the unfiltered audit log); only operators reach those.
pub fn decide(
    caller: Option<&Caller>,
    action: Action,
    resource_tenant: Option<Uuid>,
    resource_owner: Option<Uuid>,
) -> Decision {
    let Some(caller) = caller else {
        return Decision::Deny(DenyReason::Unauthenticated);
    };
    let Some(role) = caller.role else {
        return Decision::Deny(DenyReason::InsufficientRole);
    };

    if role == Role::PlatformOperator {
        return Decision::Allow;
    }
    if action.is_platform_only() {
        return Decision::Deny(DenyReason::InsufficientRole);
    }

    match (resource_tenant, caller.tenant_id) {
        (Some(resource), Some(bound)) if resource == bound => {}
        _ => return Decision::Deny(DenyReason::OutOfScope),
    }
    if !caller.tenant_active {
        return Decision::Deny(DenyReason::TenantSuspended);
    }

    match role {
        Role::TenantAdmin => Decision::Allow,
        Role::Agent if action.is_admin_only() => Decision::Deny(DenyReason::InsufficientRole),
        Role::Agent if action.is_self_scoped() => Decision::Allow,
        Role::Agent if resource_owner == Some(caller.identity_id) => Decision::Allow,
        _ => Decision::Deny(DenyReason::OutOfScope),
    }
}

/// `decide`, converted into the error a route should return.
pub fn authorize(
    caller: &Caller,
    action: Action,
    resource_tenant: Option<Uuid>,
    resource_owner: Option<Uuid>,
) -> Result<(), ApiError> {
    match decide(Some(caller), action, resource_tenant, resource_owner) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            warn!(
                "Denied {} for {} on tenant {:?}: {:?}",
                action.as_str(),
                caller.identity_id,
                resource_tenant,
                reason
            );
            Err(reason.into())
        }
    }
}

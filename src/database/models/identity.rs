use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Caller roles, most privileged first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    PlatformOperator,
    TenantAdmin,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::PlatformOperator => "platform_operator",
            Role::TenantAdmin => "tenant_admin",
            Role::Agent => "agent",
        }
    }

    /// Unknown role strings yield `None` so the policy layer can deny them.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "platform_operator" => Some(Role::PlatformOperator),
            "tenant_admin" => Some(Role::TenantAdmin),
            "agent" => Some(Role::Agent),
            _ => None,
        }
    }
}

/// An authenticated principal. The tenant binding is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    #[serde(skip_serializing)]
    pub credential_digest: String,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Builds a new identity, rejecting any role/tenant combination that breaks
    /// the binding invariant: operators have no tenant, everyone else has one.
    pub fn new(
        role: Role,
        tenant_id: Option<Uuid>,
        email: impl Into<String>,
        credential_digest: impl Into<String>,
    ) -> Result<Self, ApiError> {
        match (role, tenant_id) {
            (Role::PlatformOperator, Some(_)) => {
                return Err(ApiError::validation_error(
                    "platform operators cannot be bound to a tenant",
                    None,
                ))
            }
            (Role::TenantAdmin | Role::Agent, None) => {
                return Err(ApiError::validation_error(
                    format!("{} identities require a tenant binding", role.as_str()),
                    None,
                ))
            }
            _ => {}
        }

        Ok(Self {
            id: Uuid::new_v4(),
            role,
            tenant_id,
            email: email.into(),
            credential_digest: credential_digest.into(),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_binding_required_for_non_operators() {
        for role in [Role::TenantAdmin, Role::Agent] {
            assert!(Identity::new(role, None, "x@example.edu", "d").is_err());
            let identity = Identity::new(role, Some(Uuid::new_v4()), "x@example.edu", "d").unwrap();
            assert!(identity.tenant_id.is_some());
        }
    }

    #[test]
    fn operators_are_unbound() {
        assert!(Identity::new(Role::PlatformOperator, Some(Uuid::new_v4()), "op@x", "d").is_err());
        let op = Identity::new(Role::PlatformOperator, None, "op@x", "d").unwrap();
        assert!(op.tenant_id.is_none());
    }

    #[test]
    fn role_strings_round_trip_and_unknown_is_none() {
        for role in [Role::PlatformOperator, Role::TenantAdmin, Role::Agent] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }
}

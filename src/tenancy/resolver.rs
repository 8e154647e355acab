//! Host name -> tenant scope.
//!
//! `classify_host` is the pure part: it only looks at the host string and the
//! configured root domain. `TenantResolver` adds the label -> tenant lookup
//! with a positive-only cache that is invalidated when a tenant is renamed.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::database::store::{CrmStore, StoreError};
use crate::error::ApiError;

/// Label that selects cross-tenant operator mode.
pub const PLATFORM_LABEL: &str = "app";
/// Alias of the bare root domain.
pub const MARKETING_ALIAS: &str = "www";
/// Labels no tenant may claim.
pub const RESERVED_LABELS: [&str; 3] = [PLATFORM_LABEL, MARKETING_ALIAS, "api"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKind {
    Platform,
    Marketing,
    /// Left-most label under the root domain, not yet looked up.
    Tenant(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostScope {
    Platform,
    Marketing,
    Tenant(Uuid),
}

impl HostScope {
    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            HostScope::Tenant(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Unknown label, foreign host, or malformed host. Deliberately one variant.
    #[error("no such tenant")]
    NoSuchTenant,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NoSuchTenant => ApiError::not_found("No such tenant"),
            ResolveError::Store(e) => e.into(),
        }
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    // Strip a trailing :port, but leave bracketed IPv6 literals alone.
    let host = match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name.to_string()
        }
        _ => host,
    };
    host.trim_end_matches('.').to_string()
}

/// Classifies `host` relative to `root_domain` without touching storage.
pub fn classify_host(host: &str, root_domain: &str) -> Result<HostKind, ResolveError> {
    let host = normalize_host(host);
    let root = root_domain.trim_end_matches('.').to_ascii_lowercase();

    if host == root {
        return Ok(HostKind::Marketing);
    }

    let remainder = host
        .strip_suffix(&root)
        .and_then(|rest| rest.strip_suffix('.'))
        .ok_or(ResolveError::NoSuchTenant)?;

    match remainder {
        PLATFORM_LABEL => Ok(HostKind::Platform),
        MARKETING_ALIAS => Ok(HostKind::Marketing),
        _ => {
            let label = remainder.split('.').next().unwrap_or_default();
            if validate_subdomain(label).is_err() {
                return Err(ResolveError::NoSuchTenant);
            }
            Ok(HostKind::Tenant(label.to_string()))
        }
    }
}

/// Subdomain labels: 1-63 chars of `[a-z0-9-]`, no leading/trailing hyphen, not reserved.
pub fn validate_subdomain(label: &str) -> Result<(), ApiError> {
    let well_formed = !label.is_empty()
        && label.len() <= 63
        && label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !label.starts_with('-')
        && !label.ends_with('-');
    if !well_formed {
        return Err(ApiError::invalid_field(
            "subdomain",
            "must be 1-63 lowercase letters, digits or inner hyphens",
        ));
    }
    if RESERVED_LABELS.contains(&label) {
        return Err(ApiError::invalid_field("subdomain", format!("'{}' is reserved", label)));
    }
    Ok(())
}

#[derive(Default)]
struct LabelCache {
    labels: HashMap<String, Uuid>,
    /// Bumped by every invalidation. A fill whose store read started under an
    /// older generation is dropped.
    generation: u64,
}

pub struct TenantResolver {
    root_domain: String,
    cache: RwLock<LabelCache>,
}

impl TenantResolver {
    pub fn new(root_domain: impl Into<String>) -> Self {
        Self {
            root_domain: root_domain.into(),
            cache: RwLock::new(LabelCache::default()),
        }
    }

    pub async fn resolve(&self, host: &str, store: &dyn CrmStore) -> Result<HostScope, ResolveError> {
        let label = match classify_host(host, &self.root_domain)? {
            HostKind::Platform => return Ok(HostScope::Platform),
            HostKind::Marketing => return Ok(HostScope::Marketing),
            HostKind::Tenant(label) => label,
        };

        let generation = {
            let cache = self.cache.read().await;
            if let Some(id) = cache.labels.get(&label) {
                return Ok(HostScope::Tenant(*id));
            }
            cache.generation
        };

        let tenant = store
            .find_tenant_by_subdomain(&label)
            .await?
            .ok_or(ResolveError::NoSuchTenant)?;

        let mut cache = self.cache.write().await;
        if cache.generation == generation {
            debug!("Resolved tenant label '{}' -> {}", label, tenant.id);
            cache.labels.insert(label, tenant.id);
        } else {
            debug!("Not caching label '{}': invalidated during lookup", label);
        }
        Ok(HostScope::Tenant(tenant.id))
    }

    /// Drops every cached label pointing at `tenant_id` and discards
    /// lookups still in flight.
    pub async fn invalidate_tenant(&self, tenant_id: Uuid) {
        let mut cache = self.cache.write().await;
        cache.generation += 1;
        cache.labels.retain(|_, id| *id != tenant_id);
    }

    #[cfg(test)]
    async fn cached_labels(&self) -> Vec<String> {
        let mut labels: Vec<_> = self.cache.read().await.labels.keys().cloned().collect();
        labels.sort();
        labels
    }
}

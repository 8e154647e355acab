use std::sync::Arc;

use crate::audit::AuditLog;
use crate::auth::{JwtError, TokenSigner};
use crate::config::AppConfig;
use crate::database::store::CrmStore;
use crate::messaging::Messenger;
use crate::tenancy::TenantResolver;

/// Everything a request needs, handed to the router once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn CrmStore>,
    pub resolver: Arc<TenantResolver>,
    pub tokens: Arc<TokenSigner>,
    pub audit: Arc<AuditLog>,
    pub messenger: Arc<dyn Messenger>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn CrmStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Result<Self, JwtError> {
        let tokens = TokenSigner::new(&config.security.jwt_secret, config.security.jwt_expiry_hours)?;
        Ok(Self {
            resolver: Arc::new(TenantResolver::new(config.tenancy.root_domain.clone())),
            audit: Arc::new(AuditLog::new(&config.audit)),
            tokens: Arc::new(tokens),
            config: Arc::new(config),
            store,
            messenger,
        })
    }
}

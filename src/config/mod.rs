use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

use crate::database::models::StageDraft;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in {1:?}")]
    Missing(&'static str, Environment),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),

    #[error("Failed to read pipeline file {path}: {source}")]
    PipelineFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse pipeline file {path}: {source}")]
    PipelineYaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub tenancy: TenancyConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub audit: AuditConfig,
    pub messaging: MessagingConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Hosts are `<tenant>.<root_domain>`, `app.<root_domain>` or the bare root.
    pub root_domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub in_memory: bool,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    #[serde(skip_serializing)]
    pub billing_webhook_secret: Option<String>,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// When unset, outbound messages are only logged.
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stage set seeded into a tenant that has none.
    pub default_stages: Vec<StageDraft>,
}

impl PipelineConfig {
    pub fn builtin() -> Self {
        let stage = |name: &str, color: &str, position: i32| StageDraft {
            id: None,
            name: name.to_string(),
            color: color.to_string(),
            position,
        };
        Self {
            default_stages: vec![
                stage("New Inquiry", "#3B82F6", 0),
                stage("Contacted", "#8B5CF6", 1),
                stage("Application Started", "#F59E0B", 2),
                stage("Application Submitted", "#10B981", 3),
                stage("Enrolled", "#22C55E", 4),
                stage("Lost", "#EF4444", 5),
            ],
        }
    }

    /// Reads a YAML list of `{name, color, position}` entries.
    pub fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::PipelineFile {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw).map_err(|source| ConfigError::PipelineYaml {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        let mut default_stages: Vec<StageDraft> = serde_yaml::from_str(raw)?;
        for stage in &mut default_stages {
            stage.id = None;
        }
        Ok(Self { default_stages })
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(false)
    }

    /// `from_env`, but with storage forced in-process (`serve --memory`).
    pub fn from_env_in_memory() -> Result<Self, ConfigError> {
        Self::load(true)
    }

    fn load(force_in_memory: bool) -> Result<Self, ConfigError> {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        let mut config = match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()?;
        if force_in_memory {
            config.database.in_memory = true;
        }

        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        // Server overrides
        if let Some(v) = env::var("CRM_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("CRM_REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs = v.parse().unwrap_or(self.server.request_timeout_secs);
        }

        // Tenancy overrides
        if let Ok(v) = env::var("CRM_ROOT_DOMAIN") {
            self.tenancy.root_domain = v.trim().trim_end_matches('.').to_ascii_lowercase();
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_IN_MEMORY") {
            self.database.in_memory = v.parse().unwrap_or(self.database.in_memory);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("BILLING_WEBHOOK_SECRET") {
            self.security.billing_webhook_secret = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Audit overrides
        if let Ok(v) = env::var("AUDIT_MAX_ATTEMPTS") {
            self.audit.max_attempts = v.parse().unwrap_or(self.audit.max_attempts);
        }
        if let Ok(v) = env::var("AUDIT_RETRY_BACKOFF_MS") {
            self.audit.retry_backoff_ms = v.parse().unwrap_or(self.audit.retry_backoff_ms);
        }

        // Messaging overrides
        if let Ok(v) = env::var("MESSAGING_WEBHOOK_URL") {
            self.messaging.webhook_url = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("MESSAGING_TIMEOUT_SECS") {
            self.messaging.timeout_secs = v.parse().unwrap_or(self.messaging.timeout_secs);
        }

        // Pipeline overrides
        if let Ok(path) = env::var("PIPELINE_DEFAULT_STAGES_FILE") {
            self.pipeline = PipelineConfig::from_yaml_file(&path)?;
        }

        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET", self.environment));
        }
        if self.tenancy.root_domain.is_empty() || !self.tenancy.root_domain.contains('.') {
            return Err(ConfigError::Invalid(
                "CRM_ROOT_DOMAIN",
                format!("'{}' is not a dotted domain", self.tenancy.root_domain),
            ));
        }
        if !self.database.in_memory && self.database.url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL", self.environment));
        }
        if self.audit.max_attempts == 0 {
            return Err(ConfigError::Invalid("AUDIT_MAX_ATTEMPTS", "must be at least 1".into()));
        }
        if let Some(raw) = &self.messaging.webhook_url {
            url::Url::parse(raw).map_err(|e| ConfigError::Invalid("MESSAGING_WEBHOOK_URL", e.to_string()))?;
        }
        Ok(())
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                request_timeout_secs: 30,
            },
            tenancy: TenancyConfig {
                root_domain: "admissions.localhost".to_string(),
            },
            database: DatabaseConfig {
                url: None,
                in_memory: true,
                max_connections: 10,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                jwt_secret: "development-only-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                billing_webhook_secret: None,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            audit: AuditConfig {
                max_attempts: 3,
                retry_backoff_ms: 10,
            },
            messaging: MessagingConfig {
                webhook_url: None,
                timeout_secs: 5,
            },
            pipeline: PipelineConfig::builtin(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 8080,
                request_timeout_secs: 15,
            },
            tenancy: TenancyConfig {
                root_domain: "admissions-staging.example.com".to_string(),
            },
            database: DatabaseConfig {
                url: None,
                in_memory: false,
                max_connections: 20,
                connection_timeout: 10,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                billing_webhook_secret: None,
                cors_origins: vec!["https://app.admissions-staging.example.com".to_string()],
            },
            audit: AuditConfig {
                max_attempts: 3,
                retry_backoff_ms: 50,
            },
            messaging: MessagingConfig {
                webhook_url: None,
                timeout_secs: 5,
            },
            pipeline: PipelineConfig::builtin(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 8080,
                request_timeout_secs: 10,
            },
            tenancy: TenancyConfig {
                root_domain: "admissions.example.com".to_string(),
            },
            database: DatabaseConfig {
                url: None,
                in_memory: false,
                max_connections: 50,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
                billing_webhook_secret: None,
                cors_origins: vec!["https://app.admissions.example.com".to_string()],
            },
            audit: AuditConfig {
                max_attempts: 5,
                retry_backoff_ms: 100,
            },
            messaging: MessagingConfig {
                webhook_url: None,
                timeout_secs: 3,
            },
            pipeline: PipelineConfig::builtin(),
        }
    }
}

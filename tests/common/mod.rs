#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use admissions_crm::config::AppConfig;
use admissions_crm::database::models::{AuditLogEntry, StageDraft};
use admissions_crm::database::store::AuditQuery;
use admissions_crm::database::{CrmStore, MemoryStore};
use admissions_crm::messaging::{DeliveryStatus, Messenger, MessengerError, OutboundMessage};
use admissions_crm::workflows::tenants::bootstrap_operator;
use admissions_crm::{app, AppState};

pub const ROOT: &str = "example.edu";
pub const PLATFORM: &str = "app.example.edu";
pub const BILLING_SECRET: &str = "billing-test-secret";

/// Messenger that keeps what it was asked to send.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: AtomicBool,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, message: &OutboundMessage) -> std::result::Result<DeliveryStatus, MessengerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MessengerError::Transport("connection refused".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(DeliveryStatus::Delivered)
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.tenancy.root_domain = ROOT.to_string();
    config.security.jwt_secret = "integration-test-secret".to_string();
    config.security.billing_webhook_secret = Some(BILLING_SECRET.to_string());
    config.audit.retry_backoff_ms = 1;
    config.pipeline.default_stages = vec![
        stage("Inquiry", "#3B82F6", 0),
        stage("Application", "#F59E0B", 1),
        stage("Enrolled", "#22C55E", 2),
    ];
    config
}

fn stage(name: &str, color: &str, position: i32) -> StageDraft {
    StageDraft {
        id: None,
        name: name.to_string(),
        color: color.to_string(),
        position,
    }
}

pub struct TenantFixture {
    pub id: Uuid,
    pub subdomain: String,
    pub host: String,
    pub admin_id: Uuid,
    pub admin_token: String,
}

pub struct AgentFixture {
    pub id: Uuid,
    pub slug: String,
    pub token: String,
}

pub struct TestApp<S: CrmStore = MemoryStore> {
    pub store: Arc<S>,
    pub messenger: Arc<RecordingMessenger>,
    pub state: AppState,
    pub operator_token: String,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::with_store(Arc::new(MemoryStore::new())).await
    }
}

impl<S: CrmStore + 'static> TestApp<S> {
    pub async fn with_store(store: Arc<S>) -> Result<Self> {
        let messenger = Arc::new(RecordingMessenger::default());
        let state = AppState::new(test_config(), store.clone(), messenger.clone())?;
        let router = app(state.clone());

        let credential = bootstrap_operator(store.as_ref(), "ops@example.edu").await?;
        let mut test_app = Self {
            store,
            messenger,
            state,
            operator_token: String::new(),
            router,
        };
        test_app.operator_token = test_app.login(credential.identity_id, &credential.secret).await?;
        Ok(test_app)
    }

    pub async fn call(
        &self,
        method: Method,
        host: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(path).header("host", host);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok((status, json))
    }

    pub async fn get(&self, host: &str, path: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.call(Method::GET, host, path, token, None).await
    }

    pub async fn post(&self, host: &str, path: &str, token: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        self.call(Method::POST, host, path, token, Some(body)).await
    }

    pub async fn put(&self, host: &str, path: &str, token: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        self.call(Method::PUT, host, path, token, Some(body)).await
    }

    pub async fn patch(&self, host: &str, path: &str, token: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        self.call(Method::PATCH, host, path, token, Some(body)).await
    }

    pub async fn login(&self, identity_id: Uuid, secret: &str) -> Result<String> {
        let (status, body) = self
            .post(PLATFORM, "/auth/session", None, json!({ "identityId": identity_id, "secret": secret }))
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "login failed: {} {}", status, body);
        Ok(body["data"]["token"].as_str().context("token missing")?.to_string())
    }

    pub async fn create_tenant(&self, subdomain: &str) -> Result<TenantFixture> {
        let (status, body) = self
            .post(
                PLATFORM,
                "/tenants",
                Some(&self.operator_token),
                json!({
                    "subdomain": subdomain,
                    "name": format!("{} University", subdomain),
                    "adminEmail": format!("admin@{}.edu", subdomain),
                }),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "tenant creation failed: {} {}", status, body);

        let data = &body["data"];
        let id = uuid(&data["tenant"]["id"])?;
        let admin_id = uuid(&data["admin"]["identityId"])?;
        let secret = data["admin"]["secret"].as_str().context("admin secret")?.to_string();
        let admin_token = self.login(admin_id, &secret).await?;

        Ok(TenantFixture {
            id,
            subdomain: subdomain.to_string(),
            host: format!("{}.{}", subdomain, ROOT),
            admin_id,
            admin_token,
        })
    }

    pub async fn provision_agent(
        &self,
        tenant: &TenantFixture,
        name: &str,
        phone: Option<&str>,
    ) -> Result<AgentFixture> {
        let email = format!("{}@{}.edu", name.to_lowercase().replace(' ', "."), tenant.subdomain);
        let (status, body) = self
            .post(
                &tenant.host,
                &format!("/tenants/{}/agents", tenant.id),
                Some(&tenant.admin_token),
                json!({ "displayName": name, "email": email, "phone": phone }),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "provisioning failed: {} {}", status, body);

        let data = &body["data"];
        let id = uuid(&data["agent"]["id"])?;
        let slug = data["agent"]["slug"].as_str().context("slug")?.to_string();
        let secret = data["credential"]["secret"].as_str().context("agent secret")?.to_string();
        let token = self.login(id, &secret).await?;
        Ok(AgentFixture { id, slug, token })
    }

    /// Public intake; returns the created lead.
    pub async fn submit_lead(&self, tenant: &TenantFixture, name: &str, referral: Option<&str>) -> Result<Value> {
        let mut body = json!({ "fullName": name, "email": "applicant@example.com" });
        if let Some(referral) = referral {
            body["referral"] = json!(referral);
        }
        let (status, response) = self.post(&tenant.host, "/leads", None, body).await?;
        anyhow::ensure!(status == StatusCode::CREATED, "intake failed: {} {}", status, response);
        Ok(response["data"].clone())
    }

    pub async fn stages(&self, tenant: &TenantFixture) -> Result<Vec<Value>> {
        let (status, body) = self
            .get(&tenant.host, &format!("/tenants/{}/stages", tenant.id), Some(&tenant.admin_token))
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "stage listing failed: {} {}", status, body);
        Ok(body["data"].as_array().context("stage array")?.clone())
    }

    pub async fn audit_entries(&self, tenant_id: Uuid, action: &str) -> Result<Vec<AuditLogEntry>> {
        let query = AuditQuery {
            tenant_id: Some(tenant_id),
            actor_id: None,
            action: Some(action.to_string()),
            limit: 500,
        };
        Ok(self.store.list_audit(&query).await?)
    }
}

pub fn uuid(value: &Value) -> Result<Uuid> {
    let raw = value.as_str().with_context(|| format!("expected a uuid string, got {}", value))?;
    Ok(raw.parse()?)
}

/// Serves a fresh in-memory app on a real socket and waits for /health.
pub async fn spawn_server() -> Result<String> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let base_url = format!("http://127.0.0.1:{}", port);

    let state = AppState::new(
        test_config(),
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingMessenger::default()),
    )?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app(state)).await;
    });

    wait_ready(&base_url, Duration::from_secs(10)).await?;
    Ok(base_url)
}

async fn wait_ready(base_url: &str, timeout: Duration) -> Result<()> {
    let client = reqwest::Client::new();
    let deadline = Instant::now() + timeout;
    loop {
        if Instant::now() > deadline {
            break;
        }
        if let Ok(resp) = client.get(format!("{}/health", base_url)).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    anyhow::bail!("server did not become ready on {} within {:?}", base_url, timeout)
}

mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use admissions_crm::database::store::AuditQuery;
use admissions_crm::database::CrmStore;
use common::{TestApp, PLATFORM};

#[tokio::test]
async fn transient_audit_failures_are_retried() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;

    app.store.fail_next_audit_writes(2);
    let (status, body) = app
        .post(&harvard.host, "/leads", None, json!({ "fullName": "Maya Chen", "email": "maya@example.com" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.get("warnings").is_none());
    assert_eq!(app.audit_entries(harvard.id, "lead_created").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn persistent_audit_failure_keeps_the_change_and_warns() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let ana = app.provision_agent(&harvard, "Ana Souza", None).await?;
    let lead = app.submit_lead(&harvard, "Maya Chen", None).await?;
    let lead_id = common::uuid(&lead["id"])?;

    app.store.fail_next_audit_writes(1_000);
    let (status, body) = app
        .post(
            &harvard.host,
            &format!("/leads/{}/assign", lead_id),
            Some(&harvard.admin_token),
            json!({ "agentId": ana.id }),
        )
        .await?;
    app.store.fail_next_audit_writes(0);

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["warnings"][0]["code"], "AUDIT_DEGRADED");

    let stored = app.store.get_lead(lead_id).await?.unwrap();
    assert_eq!(stored.assigned_agent_id, Some(ana.id));
    assert!(app.audit_entries(harvard.id, "lead_assigned").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn admins_read_their_tenant_only() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let mit = app.create_tenant("mit").await?;
    app.submit_lead(&harvard, "Maya Chen", None).await?;
    app.submit_lead(&mit, "Leo Park", None).await?;

    let (status, body) = app.get(&harvard.host, "/audit-logs", Some(&harvard.admin_token)).await?;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert!(!entries.is_empty());
    let harvard_id = harvard.id.to_string();
    assert!(entries.iter().all(|e| e["tenant_id"] == harvard_id.as_str()));

    let (status, _) = app
        .get(&harvard.host, &format!("/audit-logs?tenant={}", mit.id), Some(&harvard.admin_token))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn agents_read_only_entries_they_authored() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let ana = app.provision_agent(&harvard, "Ana Souza", None).await?;
    let stages = app.stages(&harvard).await?;
    let lead = app.submit_lead(&harvard, "Maya Chen", Some(&ana.slug)).await?;

    let (status, _) = app
        .post(
            &harvard.host,
            &format!("/leads/{}/stage", lead["id"].as_str().unwrap()),
            Some(&ana.token),
            json!({ "stageId": stages[1]["id"] }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get(&harvard.host, "/audit-logs", Some(&ana.token)).await?;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "lead_stage_changed");
    assert_eq!(entries[0]["actor_id"], ana.id.to_string().as_str());
    Ok(())
}

#[tokio::test]
async fn operators_read_everything_and_limits_apply() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let mit = app.create_tenant("mit").await?;

    let (status, body) = app
        .get(PLATFORM, "/audit-logs?action=tenant_created", Some(&app.operator_token))
        .await?;
    assert_eq!(status, StatusCode::OK);
    let tenants: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["tenant_id"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(tenants.len(), 2);
    assert!(tenants.contains(&harvard.id.to_string()));
    assert!(tenants.contains(&mit.id.to_string()));

    let (status, body) = app.get(PLATFORM, "/audit-logs?limit=1", Some(&app.operator_token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, _) = app.get(PLATFORM, "/audit-logs?limit=0", Some(&app.operator_token)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.get(PLATFORM, "/audit-logs?verbose=1", Some(&app.operator_token)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn denied_requests_leave_no_trace() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let mit = app.create_tenant("mit").await?;
    let before = app.store.list_audit(&everything()).await?.len();

    let (status, _) = app
        .put(
            &harvard.host,
            &format!("/tenants/{}/stages", mit.id),
            Some(&harvard.admin_token),
            json!({ "stages": [] }),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.audit_entries(mit.id, "stages_reconciled").await?.is_empty());
    assert!(app.audit_entries(harvard.id, "stages_reconciled").await?.is_empty());
    assert_eq!(app.store.list_audit(&everything()).await?.len(), before);
    Ok(())
}

fn everything() -> AuditQuery {
    AuditQuery { limit: usize::MAX, ..Default::default() }
}

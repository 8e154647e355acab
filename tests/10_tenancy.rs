mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{TestApp, PLATFORM, ROOT};

#[tokio::test]
async fn tenant_host_routes_intake_to_its_tenant() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;

    let lead = app.submit_lead(&harvard, "Maya Chen", None).await?;
    assert_eq!(common::uuid(&lead["tenantId"])?, harvard.id);

    // Port and case do not matter.
    let (status, body) = app
        .post(
            "HARVARD.example.edu:443",
            "/leads",
            None,
            json!({ "fullName": "Leo Park", "phone": "+15550101" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(common::uuid(&body["data"]["tenantId"])?, harvard.id);
    Ok(())
}

#[tokio::test]
async fn unknown_and_foreign_hosts_are_not_found() -> Result<()> {
    let app = TestApp::new().await?;
    app.create_tenant("harvard").await?;

    for host in ["yale.example.edu", "harvard.example.com", "evil.com"] {
        let (status, body) = app
            .post(host, "/leads", None, json!({ "fullName": "X", "email": "x@example.com" }))
            .await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", host);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    // Intake on the marketing or platform host has no tenant.
    for host in [ROOT, PLATFORM] {
        let (status, _) = app
            .post(host, "/leads", None, json!({ "fullName": "X", "email": "x@example.com" }))
            .await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", host);
    }
    Ok(())
}

#[tokio::test]
async fn authenticated_routes_do_not_exist_on_the_marketing_host() -> Result<()> {
    let app = TestApp::new().await?;
    let (status, _) = app.get(ROOT, "/me", Some(&app.operator_token)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get("www.example.edu", "/me", Some(&app.operator_token)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn members_cannot_use_another_tenants_host() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let mit = app.create_tenant("mit").await?;

    let (status, _) = app.get(&mit.host, "/me", Some(&harvard.admin_token)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Operators may use any tenant host.
    let (status, _) = app
        .get(&mit.host, &format!("/tenants/{}/stages", mit.id), Some(&app.operator_token))
        .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn tenant_management_is_platform_host_only() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;

    let (status, _) = app.get(&harvard.host, "/tenants", Some(&app.operator_token)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get(PLATFORM, "/tenants", Some(&app.operator_token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    // A tenant admin on the platform host is still not an operator.
    let (status, _) = app.get(PLATFORM, "/tenants", Some(&harvard.admin_token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn reserved_and_duplicate_subdomains_are_rejected() -> Result<()> {
    let app = TestApp::new().await?;
    app.create_tenant("harvard").await?;

    let (status, body) = app
        .post(
            PLATFORM,
            "/tenants",
            Some(&app.operator_token),
            json!({ "subdomain": "app", "name": "Nope", "adminEmail": "a@b.edu" }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = app
        .post(
            PLATFORM,
            "/tenants",
            Some(&app.operator_token),
            json!({ "subdomain": "harvard", "name": "Again", "adminEmail": "a@b.edu" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn rename_moves_the_tenant_to_its_new_host() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    // Warm the resolver cache.
    app.submit_lead(&harvard, "Maya Chen", None).await?;

    let (status, body) = app
        .patch(
            PLATFORM,
            &format!("/tenants/{}", harvard.id),
            Some(&app.operator_token),
            json!({ "subdomain": "crimson" }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subdomain"], "crimson");

    let lead = json!({ "fullName": "Leo Park", "email": "leo@example.com" });
    let (status, _) = app.post(&harvard.host, "/leads", None, lead.clone()).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.post("crimson.example.edu", "/leads", None, lead).await?;
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(app.audit_entries(harvard.id, "tenant_updated").await?.len(), 1);
    Ok(())
}

mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use admissions_crm::database::CrmStore;
use common::TestApp;

fn names(stages: &[Value]) -> Vec<String> {
    stages
        .iter()
        .map(|s| s["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn new_tenants_get_the_default_pipeline_and_leads_land_first() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;

    let stages = app.stages(&harvard).await?;
    assert_eq!(names(&stages), ["Inquiry", "Application", "Enrolled"]);

    let lead = app.submit_lead(&harvard, "Maya Chen", None).await?;
    assert_eq!(lead["stageId"], stages[0]["id"]);
    Ok(())
}

#[tokio::test]
async fn deleting_a_stage_that_holds_leads_changes_nothing() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let stages = app.stages(&harvard).await?;
    let application = stages[1]["id"].as_str().unwrap().to_string();

    let mut lead_ids = Vec::new();
    for name in ["Maya Chen", "Leo Park"] {
        let lead = app.submit_lead(&harvard, name, None).await?;
        let id = lead["id"].as_str().unwrap().to_string();
        let (status, body) = app
            .post(
                &harvard.host,
                &format!("/leads/{}/stage", id),
                Some(&harvard.admin_token),
                json!({ "stageId": application }),
            )
            .await?;
        assert_eq!(status, StatusCode::OK, "{}", body);
        lead_ids.push(id.parse::<Uuid>()?);
    }

    // Rename Inquiry in the same request; the guard must stop that too.
    let (status, body) = app
        .put(
            &harvard.host,
            &format!("/tenants/{}/stages", harvard.id),
            Some(&harvard.admin_token),
            json!({
                "stages": [
                    { "id": stages[0]["id"], "name": "Prospect", "color": "#3B82F6", "position": 0 },
                    { "id": stages[2]["id"], "name": "Enrolled", "color": "#22C55E", "position": 1 },
                ],
                "deletedIds": [application],
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    assert_eq!(app.stages(&harvard).await?, stages);
    for id in lead_ids {
        let lead = app.store.get_lead(id).await?.unwrap();
        assert_eq!(lead.stage_id.map(|s| s.to_string()), Some(application.clone()));
    }
    assert!(app.audit_entries(harvard.id, "stages_reconciled").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn reconcile_deletes_updates_and_creates() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let stages = app.stages(&harvard).await?;

    let (status, body) = app
        .put(
            &harvard.host,
            &format!("/tenants/{}/stages", harvard.id),
            Some(&harvard.admin_token),
            json!({
                "stages": [
                    { "id": stages[0]["id"], "name": "  Inquiry  ", "color": "#3B82F6", "position": 10 },
                    { "id": stages[2]["id"], "name": "Enrolled", "color": "#22C55E", "position": 30 },
                    { "name": "Interview", "color": "#A855F7", "position": 20 },
                    { "name": "Waitlist", "color": "#64748B", "position": 30 },
                ],
                "deletedIds": [stages[1]["id"]],
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);

    // Equal positions keep insertion order.
    let listed = body["data"].as_array().unwrap().clone();
    assert_eq!(names(&listed), ["Inquiry", "Interview", "Enrolled", "Waitlist"]);
    assert_eq!(listed[0]["id"], stages[0]["id"]);
    assert_eq!(app.stages(&harvard).await?, listed);

    let entries = app.audit_entries(harvard.id, "stages_reconciled").await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].metadata["deleted"].as_array().map(Vec::len), Some(1));
    assert_eq!(entries[0].metadata["updated"].as_array().map(Vec::len), Some(2));
    assert_eq!(entries[0].metadata["created"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn stage_ids_of_another_tenant_are_not_found() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let mit = app.create_tenant("mit").await?;
    let mit_stages = app.stages(&mit).await?;

    let (status, _) = app
        .put(
            &harvard.host,
            &format!("/tenants/{}/stages", harvard.id),
            Some(&harvard.admin_token),
            json!({ "stages": [], "deletedIds": [mit_stages[0]["id"]] }),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.stages(&mit).await?, mit_stages);

    // Nor can a lead be moved onto one.
    let lead = app.submit_lead(&harvard, "Maya Chen", None).await?;
    let (status, _) = app
        .post(
            &harvard.host,
            &format!("/leads/{}/stage", lead["id"].as_str().unwrap()),
            Some(&harvard.admin_token),
            json!({ "stageId": mit_stages[1]["id"] }),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn malformed_stage_plans_are_rejected_whole() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let stages = app.stages(&harvard).await?;

    let (status, body) = app
        .put(
            &harvard.host,
            &format!("/tenants/{}/stages", harvard.id),
            Some(&harvard.admin_token),
            json!({
                "stages": [
                    { "name": "", "color": "blue", "position": 0 },
                    { "id": stages[1]["id"], "name": "Application", "color": "#F59E0B", "position": 1 },
                ],
                "deletedIds": [stages[1]["id"]],
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields = &body["error"]["field_errors"];
    assert!(fields["stages[0].name"].is_string());
    assert!(fields["stages[0].color"].is_string());
    assert!(fields["deletedIds[0]"].is_string());
    assert_eq!(app.stages(&harvard).await?, stages);
    Ok(())
}

#[tokio::test]
async fn agents_move_only_their_own_leads() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let ana = app.provision_agent(&harvard, "Ana Souza", None).await?;
    let stages = app.stages(&harvard).await?;

    let own = app.submit_lead(&harvard, "Maya Chen", Some(&ana.slug)).await?;
    let unassigned = app.submit_lead(&harvard, "Leo Park", None).await?;
    let target = json!({ "stageId": stages[1]["id"] });

    let (status, body) = app
        .post(
            &harvard.host,
            &format!("/leads/{}/stage", own["id"].as_str().unwrap()),
            Some(&ana.token),
            target.clone(),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, _) = app
        .post(
            &harvard.host,
            &format!("/leads/{}/stage", unassigned["id"].as_str().unwrap()),
            Some(&ana.token),
            target,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let entries = app.audit_entries(harvard.id, "lead_stage_changed").await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor_id, Some(ana.id));
    Ok(())
}

#[tokio::test]
async fn unknown_referrals_leave_the_lead_unassigned() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let lead = app.submit_lead(&harvard, "Maya Chen", Some("nobody")).await?;
    assert!(lead["assignedAgentId"].is_null());
    assert_eq!(lead["source"]["referral"], "nobody");

    let id: Uuid = lead["id"].as_str().unwrap().parse()?;
    let stored = app.store.get_lead(id).await?.unwrap();
    assert_eq!(stored.assigned_agent_id, None);

    let entries = app.audit_entries(harvard.id, "lead_created").await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor_id, None);
    Ok(())
}

#[tokio::test]
async fn referral_agent_deactivated_mid_intake_leaves_the_lead_unassigned() -> Result<()> {
    let app = TestApp::new().await?;
    let harvard = app.create_tenant("harvard").await?;
    let ana = app.provision_agent(&harvard, "Ana Souza", None).await?;

    // Ana is active when intake reads her slug, inactive by the insert.
    let gate = app.store.hold_next_slug_lookup();
    let deactivate = async {
        gate.reached.notified().await;
        app.store.set_agent_active(harvard.id, ana.id, false).await?;
        gate.release.notify_one();
        anyhow::Ok(())
    };
    let (lead, deactivated) = tokio::join!(app.submit_lead(&harvard, "Maya Chen", Some(&ana.slug)), deactivate);
    deactivated?;
    let lead = lead?;

    assert!(lead["assignedAgentId"].is_null());
    assert_eq!(lead["source"]["referral"], json!(ana.slug));
    let id: Uuid = lead["id"].as_str().unwrap().parse()?;
    assert_eq!(app.store.get_lead(id).await?.unwrap().assigned_agent_id, None);
    assert_eq!(app.audit_entries(harvard.id, "lead_created").await?.len(), 1);
    Ok(())
}

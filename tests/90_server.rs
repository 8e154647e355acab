mod common;

use anyhow::Result;
use serde_json::Value;

#[tokio::test]
async fn live_server_answers_health_and_root() -> Result<()> {
    let base_url = common::spawn_server().await?;
    let client = reqwest::Client::new();

    let health = client.get(format!("{}/health", base_url)).send().await?;
    assert!(health.status().is_success());
    let body: Value = health.json().await?;
    assert_eq!(body["success"], true);

    let root = client.get(format!("{}/", base_url)).send().await?;
    assert!(root.status().is_success());

    // 127.0.0.1 is not under the root domain.
    let intake = client
        .post(format!("{}/leads", base_url))
        .json(&serde_json::json!({ "fullName": "Maya Chen", "email": "maya@example.com" }))
        .send()
        .await?;
    assert_eq!(intake.status().as_u16(), 404);
    Ok(())
}

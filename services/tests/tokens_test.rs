mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{TestApp, id_of, with_api_token};
use inventory_services::database::{ApiTokenRecord, SqlStorage};
use serde_json::{Value, json};
use uuid::Uuid;

#[tokio::test]
async fn data_requires_a_valid_token() {
    let app = TestApp::new().await;

    app.server
        .get("/v1/data")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let response = with_api_token(app.server.get("/v1/data"), "not-a-real-token").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"], "unauthorized");
}

#[tokio::test]
async fn token_exposes_aggregated_inventory() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let inventory = app.inventory(&alice, false).await;

    for price in [10.0, 30.0] {
        app.server
            .post(&format!("/v1/inventories/{inventory}/items"))
            .authorization_bearer(&alice.token)
            .json(&json!({ "values": { "string1": "Clamp", "number1": price } }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let response = app
        .server
        .post(&format!("/v1/inventories/{inventory}/tokens"))
        .authorization_bearer(&alice.token)
        .json(&json!({ "name": "Reporting" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let token = response.json::<Value>();
    let secret = token["token"].as_str().unwrap().to_owned();
    assert_eq!(secret.len(), 43);

    let response = with_api_token(app.server.get("/v1/data"), &secret).await;
    response.assert_status_ok();
    let data = response.json::<Value>();
    assert_eq!(data["title"], "Workshop");
    assert_eq!(data["total_items"], 2);

    app.server
        .delete(&format!("/v1/tokens/{}", id_of(&token)))
        .authorization_bearer(&alice.token)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    with_api_token(app.server.get("/v1/data"), &secret)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn strangers_cannot_issue_tokens() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let inventory = app.inventory(&alice, true).await;

    app.server
        .post(&format!("/v1/inventories/{inventory}/tokens"))
        .authorization_bearer(&bob.token)
        .json(&json!({}))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .post(&format!("/v1/inventories/{inventory}/tokens"))
        .authorization_bearer(&alice.token)
        .json(&json!({ "expires_in_days": 0 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let inventory = app.inventory(&alice, false).await;
    let created_at = Utc::now() - Duration::days(30);
    app.sql
        .api_tokens_insert(&ApiTokenRecord {
            id: Uuid::new_v4(),
            inventory_id: inventory,
            token: "stale-reporting-token".to_owned(),
            name: Some("Reporting".to_owned()),
            created_by: alice.id(),
            created_at,
            expires_at: Some(created_at + Duration::days(7)),
            is_active: true,
            last_used_at: None,
        })
        .await
        .unwrap();

    with_api_token(app.server.get("/v1/data"), "stale-reporting-token")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn huge_expiry_is_a_bad_request() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let inventory = app.inventory(&alice, false).await;

    let response = app
        .server
        .post(&format!("/v1/inventories/{inventory}/tokens"))
        .authorization_bearer(&alice.token)
        .json(&json!({ "expires_in_days": 200_000_000_000_i64 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Expiration is too far away");
}

mod common;

use axum::http::StatusCode;
use common::{TestApp, id_of};
use serde_json::{Value, json};

#[tokio::test]
async fn generated_ids_follow_the_default_format() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let inventory = app.inventory(&alice, false).await;

    for expected in ["ITEM-000001", "ITEM-000002"] {
        let response = app
            .server
            .post(&format!("/v1/inventories/{inventory}/items"))
            .authorization_bearer(&alice.token)
            .json(&json!({ "values": { "string1": "Drill", "number1": 49.5 } }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let item = response.json::<Value>();
        assert_eq!(item["custom_id"], expected);
        assert_eq!(item["values"]["string1"], "Drill");
        assert_eq!(item["created_by_username"], "alice");
    }

    let items = app
        .server
        .get(&format!("/v1/inventories/{inventory}/items"))
        .await
        .json::<Vec<Value>>();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn duplicate_custom_id_conflicts() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let inventory = app.inventory(&alice, false).await;
    let body = json!({ "custom_id": "ITEM-000042", "values": {} });

    app.server
        .post(&format!("/v1/inventories/{inventory}/items"))
        .authorization_bearer(&alice.token)
        .json(&body)
        .await
        .assert_status(StatusCode::CREATED);

    let response = app
        .server
        .post(&format!("/v1/inventories/{inventory}/items"))
        .authorization_bearer(&alice.token)
        .json(&body)
        .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"], "conflict");
}

#[tokio::test]
async fn private_inventory_rejects_strangers() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let mallory = app.user("mallory").await;
    let inventory = app.inventory(&alice, false).await;

    app.server
        .post(&format!("/v1/inventories/{inventory}/items"))
        .authorization_bearer(&mallory.token)
        .json(&json!({ "values": {} }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn public_inventory_accepts_any_signed_in_user() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let inventory = app.inventory(&alice, true).await;

    app.server
        .post(&format!("/v1/inventories/{inventory}/items"))
        .authorization_bearer(&bob.token)
        .json(&json!({ "values": { "string1": "Saw" } }))
        .await
        .assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn update_checks_version_and_likes_toggle() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let inventory = app.inventory(&alice, false).await;

    let created = app
        .server
        .post(&format!("/v1/inventories/{inventory}/items"))
        .authorization_bearer(&alice.token)
        .json(&json!({ "values": { "string1": "Drill" } }))
        .await
        .json::<Value>();
    let id = id_of(&created);

    let updated = app
        .server
        .put(&format!("/v1/items/{id}"))
        .authorization_bearer(&alice.token)
        .json(&json!({ "values": { "string1": "Hammer drill" }, "version": 1 }))
        .await;
    updated.assert_status_ok();
    assert_eq!(updated.json::<Value>()["version"], 2);

    app.server
        .put(&format!("/v1/items/{id}"))
        .authorization_bearer(&alice.token)
        .json(&json!({ "values": {}, "version": 1 }))
        .await
        .assert_status(StatusCode::CONFLICT);

    app.server
        .post(&format!("/v1/items/{id}/like"))
        .authorization_bearer(&bob.token)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let seen = app
        .server
        .get(&format!("/v1/items/{id}"))
        .authorization_bearer(&bob.token)
        .await
        .json::<Value>();
    assert_eq!(seen["like_count"], 1);
    assert_eq!(seen["is_liked_by_current_user"], true);

    app.server
        .delete(&format!("/v1/items/{id}/like"))
        .authorization_bearer(&bob.token)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let seen = app.server.get(&format!("/v1/items/{id}")).await.json::<Value>();
    assert_eq!(seen["like_count"], 0);
}

#[tokio::test]
async fn unknown_item_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .server
        .get(&format!("/v1/items/{}", uuid::Uuid::new_v4()))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["message"], "Item not found");
}

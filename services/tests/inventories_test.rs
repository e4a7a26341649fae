mod common;

use axum::http::StatusCode;
use common::{TestApp, id_of};
use serde_json::{Value, json};

#[tokio::test]
async fn create_requires_authentication() {
    let app = TestApp::new().await;

    let response = app
        .server
        .post("/v1/inventories")
        .json(&json!({ "title": "Anonymous" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn creator_sees_write_access_and_others_do_not() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let id = app.inventory(&alice, false).await;

    let detail = app
        .server
        .get(&format!("/v1/inventories/{id}"))
        .authorization_bearer(&alice.token)
        .await
        .json::<Value>();
    assert_eq!(detail["title"], "Workshop");
    assert_eq!(detail["creator_username"], "alice");
    assert_eq!(detail["has_write_access"], true);
    assert_eq!(detail["version"], 1);
    assert_eq!(detail["tags"], json!(["tools"]));

    let detail = app
        .server
        .get(&format!("/v1/inventories/{id}"))
        .authorization_bearer(&bob.token)
        .await
        .json::<Value>();
    assert_eq!(detail["has_write_access"], false);
}

#[tokio::test]
async fn stale_version_is_rejected() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let id = app.inventory(&alice, false).await;

    let update = |version: i32| {
        json!({
            "title": "Renamed workshop",
            "description": "",
            "is_public": false,
            "tags": [],
            "custom_fields": [],
            "version": version
        })
    };

    let response = app
        .server
        .put(&format!("/v1/inventories/{id}"))
        .authorization_bearer(&alice.token)
        .json(&update(1))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["version"], 2);

    let response = app
        .server
        .put(&format!("/v1/inventories/{id}"))
        .authorization_bearer(&alice.token)
        .json(&update(1))
        .await;
    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn only_creator_can_delete() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let id = app.inventory(&alice, true).await;

    app.server
        .delete(&format!("/v1/inventories/{id}"))
        .authorization_bearer(&bob.token)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .delete(&format!("/v1/inventories/{id}"))
        .authorization_bearer(&alice.token)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    app.server
        .get(&format!("/v1/inventories/{id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listings_and_tags() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let public = app.inventory(&alice, true).await;
    let private = app.inventory(&alice, false).await;

    let mine = app
        .server
        .get("/v1/inventories/my")
        .authorization_bearer(&alice.token)
        .await
        .json::<Vec<Value>>();
    assert_eq!(mine.len(), 2);

    let listed = app.server.get("/v1/inventories/public").await.json::<Vec<Value>>();
    let ids: Vec<_> = listed.iter().map(id_of).collect();
    assert!(ids.contains(&public));
    assert!(!ids.contains(&private));

    let tagged = app
        .server
        .get("/v1/tags/tools/inventories")
        .await
        .json::<Vec<Value>>();
    assert!(!tagged.is_empty());

    let categories = app.server.get("/v1/categories").await.json::<Vec<Value>>();
    assert_eq!(categories[0]["name"], "Equipment");
}

#[tokio::test]
async fn invalid_input_is_a_bad_request() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;

    let response = app
        .server
        .post("/v1/inventories")
        .authorization_bearer(&alice.token)
        .json(&json!({ "title": "   " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "bad_request");
}

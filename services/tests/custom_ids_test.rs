mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::{Value, json};

fn tool_format() -> Value {
    json!({
        "elements": [
            { "position": 0, "element_type": "Fixed", "value": "TOOL-" },
            { "position": 1, "element_type": "Sequence" }
        ]
    })
}

#[tokio::test]
async fn saved_format_drives_new_items() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let inventory = app.inventory(&alice, false).await;

    let saved = app
        .server
        .put(&format!("/v1/inventories/{inventory}/custom-id"))
        .authorization_bearer(&alice.token)
        .json(&tool_format())
        .await;
    saved.assert_status_ok();
    assert_eq!(saved.json::<Vec<Value>>().len(), 2);

    let item = app
        .server
        .post(&format!("/v1/inventories/{inventory}/items"))
        .authorization_bearer(&alice.token)
        .json(&json!({ "values": {} }))
        .await
        .json::<Value>();
    assert!(item["custom_id"].as_str().unwrap().starts_with("TOOL-"));

    let check = |candidate: &'static str| {
        app.server
            .post(&format!("/v1/inventories/{inventory}/custom-id/validate"))
            .json(&json!({ "custom_id": candidate }))
    };
    assert_eq!(check("TOOL-7").await.json::<Value>()["is_valid"], true);
    assert_eq!(check("ITEM-7").await.json::<Value>()["is_valid"], false);

    app.server
        .post(&format!("/v1/inventories/{inventory}/items"))
        .authorization_bearer(&alice.token)
        .json(&json!({ "custom_id": "ITEM-7", "values": {} }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn preview_rejects_unknown_elements() {
    let app = TestApp::new().await;

    let preview = app.server.post("/v1/custom-id/preview").json(&tool_format()).await;
    preview.assert_status_ok();
    assert!(
        preview.json::<Value>()["preview"]
            .as_str()
            .unwrap()
            .starts_with("TOOL-")
    );

    app.server
        .post("/v1/custom-id/preview")
        .json(&json!({ "elements": [{ "position": 0, "element_type": "Emoji" }] }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn image_uploads_are_presigned() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;

    let response = app
        .server
        .post("/v1/uploads/images")
        .authorization_bearer(&alice.token)
        .json(&json!({ "filename": "drill.png", "content_type": "image/png", "file_size": 2048 }))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert!(response.json::<Value>()["public_url"].as_str().is_some());

    app.server
        .post("/v1/uploads/images")
        .authorization_bearer(&alice.token)
        .json(&json!({ "filename": "notes.txt", "content_type": "text/plain", "file_size": 10 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

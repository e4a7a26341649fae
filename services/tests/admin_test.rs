mod common;

use axum::http::StatusCode;
use common::TestApp;
use inventory_services::{crm::MockCrmClient, email::RecordingMailer, state::Integrations};
use serde_json::{Value, json};

#[tokio::test]
async fn non_admins_are_forbidden() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;

    let response = app
        .server
        .get("/v1/admin/users")
        .authorization_bearer(&alice.token)
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["message"], "Admin role required");
}

#[tokio::test]
async fn admin_lists_and_searches_users() {
    let app = TestApp::new().await;
    let root = app.admin("root").await;
    let alice = app.user("alice").await;
    app.inventory(&alice, false).await;

    let users = app
        .server
        .get("/v1/admin/users")
        .authorization_bearer(&root.token)
        .await
        .json::<Vec<Value>>();
    assert_eq!(users.len(), 2);
    let listed = users.iter().find(|u| u["username"] == "alice").unwrap();
    assert_eq!(listed["inventory_count"], 1);

    let found = app
        .server
        .get("/v1/admin/users/search")
        .add_query_param("q", "ali")
        .authorization_bearer(&root.token)
        .await
        .json::<Vec<Value>>();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn blocked_users_cannot_log_in() {
    let app = TestApp::new().await;
    let root = app.admin("root").await;
    app.server
        .post("/auth/register")
        .json(&json!({
            "username": "grace",
            "email": "grace@example.com",
            "password": "hunter22",
            "confirm_password": "hunter22"
        }))
        .await
        .assert_status(StatusCode::CREATED);
    let grace = app
        .server
        .get("/v1/admin/users/search")
        .add_query_param("q", "grace")
        .authorization_bearer(&root.token)
        .await
        .json::<Vec<Value>>()[0]["id"]
        .as_str()
        .unwrap()
        .to_owned();

    app.server
        .post(&format!("/v1/admin/users/{grace}/block"))
        .authorization_bearer(&root.token)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.server
        .post(&format!("/v1/admin/users/{grace}/block"))
        .authorization_bearer(&root.token)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let login = json!({ "email": "grace@example.com", "password": "hunter22" });
    app.server
        .post("/auth/login")
        .json(&login)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .post(&format!("/v1/admin/users/{grace}/unblock"))
        .authorization_bearer(&root.token)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.server
        .post("/auth/login")
        .json(&login)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn admin_role_can_be_granted_and_users_deleted() {
    let app = TestApp::new().await;
    let root = app.admin("root").await;
    let alice = app.user("alice").await;

    app.server
        .post(&format!("/v1/admin/users/{}/admin", alice.id()))
        .authorization_bearer(&root.token)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.server
        .get("/v1/admin/users")
        .authorization_bearer(&alice.token)
        .await
        .assert_status_ok();

    app.server
        .delete(&format!("/v1/admin/users/{}", alice.id()))
        .authorization_bearer(&root.token)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.server
        .delete(&format!("/v1/admin/users/{}", alice.id()))
        .authorization_bearer(&root.token)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn crm_is_unavailable_without_configuration() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;

    app.server
        .get("/v1/crm/status")
        .authorization_bearer(&alice.token)
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn crm_sync_runs_once() {
    let mailer = RecordingMailer::new();
    let crm = MockCrmClient::new();
    let app = TestApp::with_integrations(
        Integrations::for_test()
            .with_mailer(mailer.clone())
            .with_crm(crm.clone()),
        mailer,
    )
    .await;
    let alice = app.user("alice").await;
    let body = json!({
        "first_name": "Alice",
        "last_name": "Smith",
        "email": "alice@example.com",
        "company": "Acme"
    });

    let response = app
        .server
        .post("/v1/crm/accounts")
        .authorization_bearer(&alice.token)
        .json(&body)
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<Value>()["success"], true);
    assert_eq!(crm.accounts()[0].name, "Acme");

    let status = app
        .server
        .get("/v1/crm/status")
        .authorization_bearer(&alice.token)
        .await
        .json::<Value>();
    assert_eq!(status["is_synced"], true);

    app.server
        .post("/v1/crm/accounts")
        .authorization_bearer(&alice.token)
        .json(&body)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

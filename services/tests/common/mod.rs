//! Shared test utilities for integration tests.
//!
//! [`TestApp`] runs the full router over in-memory storages and keeps handles
//! to them so tests can seed data and inspect side effects.

#![allow(dead_code)]

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use inventory_services::{
    auth::generate_session_token,
    config::Config,
    database::MockSqlStorage,
    email::RecordingMailer,
    routes,
    state::Integrations,
    users::storage::{MockUserStorage, NewUser, Role, StoredUser, UserStorage},
};
use serde_json::{Value, json};
use uuid::Uuid;

pub struct TestApp {
    pub server: TestServer,
    pub sql: MockSqlStorage,
    pub users: MockUserStorage,
    pub config: Config,
    pub mailer: RecordingMailer,
}

/// A seeded account and a session token for it.
pub struct TestUser {
    pub user: StoredUser,
    pub token: String,
}

impl TestUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let mailer = RecordingMailer::new();
        Self::with_integrations(Integrations::for_test().with_mailer(mailer.clone()), mailer).await
    }

    pub async fn with_integrations(integrations: Integrations, mailer: RecordingMailer) -> Self {
        let sql = MockSqlStorage::new();
        let users = MockUserStorage::new();
        let config = Config::new_for_test();
        let app = routes(sql.clone(), users.clone(), integrations, config.clone()).await;

        Self {
            server: TestServer::new(app).unwrap(),
            sql,
            users,
            config,
            mailer,
        }
    }

    async fn seed(&self, new_user: NewUser) -> TestUser {
        let user = self.users.create_user(new_user).await.unwrap();
        let token = generate_session_token(&user, &self.config).unwrap();
        TestUser { user, token }
    }

    pub async fn user(&self, username: &str) -> TestUser {
        self.seed(NewUser::local(
            format!("{username}@example.com"),
            username,
            "$argon2id$unused",
        ))
        .await
    }

    pub async fn admin(&self, username: &str) -> TestUser {
        self.seed(
            NewUser::local(format!("{username}@example.com"), username, "$argon2id$unused")
                .with_roles(vec![Role::Admin, Role::User]),
        )
        .await
    }

    /// Creates an inventory with a `Name` string and a `Price` number field.
    pub async fn inventory(&self, owner: &TestUser, is_public: bool) -> Uuid {
        let response = self
            .server
            .post("/v1/inventories")
            .authorization_bearer(&owner.token)
            .json(&json!({
                "title": "Workshop",
                "description": "Tools in the shared workshop",
                "is_public": is_public,
                "tags": ["tools"],
                "custom_fields": [
                    { "type": "string", "name": "Name", "show_in_table": true },
                    { "type": "number", "name": "Price", "show_in_table": true }
                ]
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        id_of(&response.json::<Value>())
    }
}

pub fn id_of(body: &Value) -> Uuid {
    body["id"].as_str().unwrap().parse().unwrap()
}

/// Adds `X-API-Token`.
pub fn with_api_token(request: TestRequest, token: &str) -> TestRequest {
    request.add_header(
        HeaderName::from_static("x-api-token"),
        HeaderValue::from_str(token).unwrap(),
    )
}

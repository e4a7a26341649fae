//! Catalog rules: inventories, items, grants, comments, custom IDs and API
//! tokens.
//!
//! [`Catalog`] borrows both storages for the length of one request. Handlers
//! build it through [`AppState::catalog`](crate::state::AppState::catalog)
//! and map [`CatalogError`] straight into a response.

pub mod access;
pub mod comments;
pub mod custom_ids;
pub mod inventories;
pub mod items;
pub mod tokens;

use crate::database::{InventoryRecord, SqlStorage, SqlStorageError};
use crate::fields::FieldError;
use crate::users::storage::{UserStorage, UserStorageError};
use crate::v1::types::V1ErrorResponse;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

pub const INVENTORY_NOT_FOUND: &str = "Inventory not found";
pub const ITEM_NOT_FOUND: &str = "Item not found";
const LIST_DESCRIPTION_CHARS: usize = 150;
/// Shown for creators and authors whose account is gone.
pub const UNKNOWN_USERNAME: &str = "Unknown";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    /// Duplicates and stale versions.
    #[error("{0}")]
    Conflict(String),

    #[error("Invalid or expired API token")]
    InvalidToken,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CatalogError {
    pub fn not_found(message: &str) -> Self {
        Self::NotFound(message.to_owned())
    }

    pub fn forbidden(message: &str) -> Self {
        Self::Forbidden(message.to_owned())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: &str) -> Self {
        Self::Conflict(message.to_owned())
    }
}

impl From<SqlStorageError> for CatalogError {
    fn from(err: SqlStorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<UserStorageError> for CatalogError {
    fn from(err: UserStorageError) -> Self {
        match err {
            UserStorageError::UserNotFound(_) => Self::not_found("User not found"),
            UserStorageError::InvalidInput(message) => Self::Validation(message),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<FieldError> for CatalogError {
    fn from(err: FieldError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<CatalogError> for (StatusCode, Json<V1ErrorResponse>) {
    fn from(err: CatalogError) -> Self {
        let body = match &err {
            CatalogError::NotFound(message) => V1ErrorResponse::not_found(message),
            CatalogError::Forbidden(message) => V1ErrorResponse::forbidden(message),
            CatalogError::Validation(message) => V1ErrorResponse::bad_request(message),
            CatalogError::Conflict(message) => V1ErrorResponse::conflict(message),
            CatalogError::InvalidToken => V1ErrorResponse::unauthorized(err.to_string()),
            CatalogError::Storage(_) => V1ErrorResponse::internal_error("Internal server error"),
        };
        let status = match err {
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::Forbidden(_) => StatusCode::FORBIDDEN,
            CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
            CatalogError::Conflict(_) => StatusCode::CONFLICT,
            CatalogError::InvalidToken => StatusCode::UNAUTHORIZED,
            CatalogError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(body))
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        if let Self::Storage(message) = &self {
            tracing::error!(error = %message, "Catalog storage failure");
        }
        <(StatusCode, Json<V1ErrorResponse>)>::from(self).into_response()
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Catalog operations over one pair of storages.
pub struct Catalog<'a, S, U> {
    sql: &'a S,
    users: &'a U,
}

impl<'a, S: SqlStorage, U: UserStorage> Catalog<'a, S, U> {
    pub fn new(sql: &'a S, users: &'a U) -> Self {
        Self { sql, users }
    }

    async fn inventory(&self, id: Uuid) -> CatalogResult<InventoryRecord> {
        self.sql
            .inventories_get(id)
            .await?
            .ok_or_else(|| CatalogError::not_found(INVENTORY_NOT_FOUND))
    }

    /// Roles come from storage so a revoked admin loses rights before their
    /// session token expires.
    pub async fn is_admin(&self, user_id: Uuid) -> CatalogResult<bool> {
        Ok(self
            .users
            .get_user(user_id)
            .await?
            .is_some_and(|user| user.is_admin()))
    }

    async fn is_creator_or_admin(
        &self,
        user_id: Uuid,
        inventory: &InventoryRecord,
    ) -> CatalogResult<bool> {
        if inventory.creator_id == user_id {
            return Ok(true);
        }
        self.is_admin(user_id).await
    }

    /// Creator, Admin, any user of a public inventory, or an explicit grant.
    /// Anonymous callers never have write access.
    pub async fn has_write_access(
        &self,
        user_id: Option<Uuid>,
        inventory: &InventoryRecord,
    ) -> CatalogResult<bool> {
        let Some(user_id) = user_id else {
            return Ok(false);
        };
        if inventory.is_public || self.is_creator_or_admin(user_id, inventory).await? {
            return Ok(true);
        }
        Ok(self.sql.access_exists(inventory.id, user_id).await?)
    }

    async fn username(&self, user_id: Uuid) -> CatalogResult<String> {
        let mut names = self.users.usernames(&[user_id]).await?;
        Ok(names
            .remove(&user_id)
            .unwrap_or_else(|| UNKNOWN_USERNAME.to_owned()))
    }
}

/// Shortens list descriptions to 150 characters plus `...`.
pub fn truncate_description(description: &str) -> String {
    match description.char_indices().nth(LIST_DESCRIPTION_CHARS) {
        Some((cut, _)) => format!("{}...", &description[..cut]),
        None => description.to_owned(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Catalog;
    use super::inventories::InventoryInput;
    use crate::database::MockSqlStorage;
    use crate::fields::{FieldInput, FieldKind};
    use crate::users::storage::{MockUserStorage, NewUser, Role, UserStorage};
    use uuid::Uuid;

    pub(crate) struct Fixture {
        pub sql: MockSqlStorage,
        pub users: MockUserStorage,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self {
                sql: MockSqlStorage::new(),
                users: MockUserStorage::new(),
            }
        }

        pub fn catalog(&self) -> Catalog<'_, MockSqlStorage, MockUserStorage> {
            Catalog::new(&self.sql, &self.users)
        }

        pub async fn user(&self, username: &str) -> Uuid {
            self.users
                .create_user(NewUser::local(
                    format!("{username}@example.com"),
                    username,
                    "$argon2id$unused",
                ))
                .await
                .unwrap()
                .id
        }

        pub async fn admin(&self, username: &str) -> Uuid {
            self.users
                .create_user(
                    NewUser::local(format!("{username}@example.com"), username, "$argon2id$unused")
                        .with_roles(vec![Role::Admin, Role::User]),
                )
                .await
                .unwrap()
                .id
        }

        /// A private inventory with a `Name` string field and a `Price`
        /// number field, both shown in tables.
        pub async fn inventory(&self, creator_id: Uuid) -> Uuid {
            let field = |kind, name: &str| FieldInput {
                kind,
                name: name.into(),
                description: None,
                show_in_table: true,
            };
            let input = InventoryInput {
                title: "Equipment".into(),
                description: String::new(),
                image_url: None,
                category_id: None,
                is_public: false,
                tags: Vec::new(),
                custom_fields: vec![
                    field(FieldKind::String, "Name"),
                    field(FieldKind::Number, "Price"),
                ],
            };
            self.catalog()
                .create_inventory(creator_id, input)
                .await
                .unwrap()
                .id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_descriptions_are_untouched() {
        assert_eq!(truncate_description("tools"), "tools");
        let exact = "x".repeat(150);
        assert_eq!(truncate_description(&exact), exact);
    }

    #[test]
    fn long_descriptions_are_cut_on_characters() {
        let long = "é".repeat(151);
        let cut = truncate_description(&long);
        assert_eq!(cut.chars().count(), 153);
        assert!(cut.ends_with("é..."));
    }

    #[test]
    fn errors_map_to_statuses() {
        let cases = [
            (CatalogError::not_found("x"), StatusCode::NOT_FOUND),
            (CatalogError::forbidden("x"), StatusCode::FORBIDDEN),
            (CatalogError::validation("x"), StatusCode::BAD_REQUEST),
            (CatalogError::conflict("x"), StatusCode::CONFLICT),
            (CatalogError::InvalidToken, StatusCode::UNAUTHORIZED),
            (
                CatalogError::Storage("db down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let (status, Json(body)) = <(StatusCode, Json<V1ErrorResponse>)>::from(err);
            assert_eq!(status, expected);
            assert!(!body.message.contains("db down"));
        }
    }
}

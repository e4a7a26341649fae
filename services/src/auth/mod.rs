//! Authentication: accounts, session tokens, and the `/auth` routes.

pub mod password;
pub mod routes;
pub mod service;
pub mod session;
pub mod session_auth;

pub use routes::auth_routes;
pub use service::AuthService;
pub use session::{SessionClaims, generate_session_token, validate_session_token};
pub use session_auth::{OptionalAuth, RequireAuth, SessionAuthError};

use crate::oauth::OAuthError;
use crate::users::storage::{StoredUser, UserStorageError};
use crate::v1::types::V1ErrorResponse;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("This account uses social login. Please use Google or GitHub to sign in.")]
    SocialAccount,

    #[error("Your account has been blocked")]
    Blocked,

    /// Email or username already taken.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to issue session token: {0}")]
    Token(String),
}

impl From<UserStorageError> for AuthError {
    fn from(err: UserStorageError) -> Self {
        match err {
            UserStorageError::UserAlreadyExists(_) => {
                Self::Conflict("User with this email already exists".to_owned())
            }
            UserStorageError::UserNotFound(_) => Self::NotFound("User not found".to_owned()),
            UserStorageError::InvalidInput(message) => Self::Validation(message),
            UserStorageError::StorageError(message) => Self::Storage(message),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Token(err.to_string())
    }
}

impl From<AuthError> for (StatusCode, Json<V1ErrorResponse>) {
    fn from(err: AuthError) -> Self {
        let (status, code) = match &err {
            AuthError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AuthError::SocialAccount => (StatusCode::BAD_REQUEST, "social_account"),
            AuthError::Blocked => (StatusCode::FORBIDDEN, "account_blocked"),
            AuthError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AuthError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AuthError::OAuth(OAuthError::InvalidToken(_)) => {
                (StatusCode::UNAUTHORIZED, "invalid_provider_token")
            }
            AuthError::OAuth(OAuthError::NotConfigured) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            AuthError::OAuth(OAuthError::Http(_)) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            AuthError::OAuth(_) => (StatusCode::BAD_REQUEST, "oauth_error"),
            AuthError::Storage(_) | AuthError::Token(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_owned(),
            _ => err.to_string(),
        };
        (status, Json(V1ErrorResponse::new(code, message)))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Storage(_) | Self::Token(_) = &self {
            tracing::error!(error = %self, "Auth request failed");
        }
        <(StatusCode, Json<V1ErrorResponse>)>::from(self).into_response()
    }
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub roles: Vec<String>,
    pub ui_language: String,
    pub ui_theme: String,
}

impl From<&StoredUser> for UserDto {
    fn from(user: &StoredUser) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            roles: user.role_names(),
            ui_language: user.ui_language.clone(),
            ui_theme: user.ui_theme.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserDto,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreferencesRequest {
    pub language: String,
    pub theme: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTokenRequest {
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubCodeRequest {
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

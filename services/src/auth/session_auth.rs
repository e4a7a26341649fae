//! Session-based JWT authentication for protected routes.
//!
//! [`RequireAuth`] rejects requests without a valid bearer token.
//! [`OptionalAuth`] lets anonymous requests through but still rejects a
//! token that is present and invalid.
//!
//! # Usage
//!
//! ```rust,ignore
//! use inventory_services::auth::RequireAuth;
//!
//! async fn protected_handler(auth: RequireAuth) -> impl IntoResponse {
//!     format!("Hello, {}!", auth.username())
//! }
//! ```
//!
//! # Token Requirements
//!
//! The JWT must:
//! - Be signed with the server's `JWT_SECRET`
//! - Have a valid `exp` (expiration) claim
//! - Have a `sub` (subject) claim containing the user id
//! - Have `iss` and `aud` claims matching the configured issuer and audience

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use uuid::Uuid;

use super::session::{SessionClaims, validate_session_token};
use crate::config::Config;

/// Authenticated user context extracted from a valid session JWT.
///
/// # Rejection
///
/// Returns `SessionAuthError` (401 Unauthorized) if the token is missing,
/// malformed, badly signed, expired, or issued for someone else.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    claims: SessionClaims,
}

impl RequireAuth {
    pub fn user_id(&self) -> Uuid {
        self.claims.sub
    }

    pub fn username(&self) -> &str {
        &self.claims.username
    }

    pub fn email(&self) -> &str {
        &self.claims.email
    }

    pub fn claims(&self) -> &SessionClaims {
        &self.claims
    }
}

/// Like [`RequireAuth`], but `None` when no `Authorization` header is sent.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<RequireAuth>);

impl OptionalAuth {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().map(RequireAuth::user_id)
    }
}

/// Error type for session authentication failures.
#[derive(Debug, Serialize)]
pub struct SessionAuthError {
    pub error: String,
    pub message: String,
}

impl SessionAuthError {
    fn missing_token() -> Self {
        Self {
            error: "missing_token".to_owned(),
            message: "Authorization header with Bearer token is required".to_owned(),
        }
    }

    fn invalid_format() -> Self {
        Self {
            error: "invalid_format".to_owned(),
            message: "Authorization header must be in format: Bearer <token>".to_owned(),
        }
    }

    fn invalid_token(reason: impl Into<String>) -> Self {
        Self {
            error: "invalid_token".to_owned(),
            message: reason.into(),
        }
    }

    fn missing_config() -> Self {
        Self {
            error: "server_error".to_owned(),
            message: "Server configuration error".to_owned(),
        }
    }
}

impl IntoResponse for SessionAuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(self)).into_response()
    }
}

/// Extract the Bearer token from the Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header_value = headers.get(AUTHORIZATION)?;
    let header_str = header_value.to_str().ok()?;

    let stripped = header_str.strip_prefix("Bearer ")?;
    if stripped.is_empty() {
        return None;
    }
    Some(stripped)
}

fn authenticate(parts: &Parts) -> Result<RequireAuth, SessionAuthError> {
    let config = parts
        .extensions
        .get::<Config>()
        .ok_or_else(SessionAuthError::missing_config)?;

    let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
        if parts.headers.contains_key(AUTHORIZATION) {
            SessionAuthError::invalid_format()
        } else {
            SessionAuthError::missing_token()
        }
    })?;

    let claims = validate_session_token(token, config).map_err(SessionAuthError::invalid_token)?;

    Ok(RequireAuth { claims })
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = SessionAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        authenticate(parts)
    }
}

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = SessionAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(Self(None));
        }
        authenticate(parts).map(|auth| Self(Some(auth)))
    }
}

//! Session JWTs.
//!
//! Tokens are HS256-signed with `JWT_SECRET` and carry enough of the profile
//! for clients to render without another round trip. Authorization decisions
//! still read roles from storage.

use crate::config::Config;
use crate::users::storage::StoredUser;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: Uuid,
    pub email: String,
    pub username: String,
    pub roles: Vec<String>,
    pub ui_language: String,
    pub ui_theme: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn for_user(user: &StoredUser, config: &Config) -> Self {
        let iat = Utc::now().timestamp();
        Self {
            sub: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            roles: user.role_names(),
            ui_language: user.ui_language.clone(),
            ui_theme: user.ui_theme.clone(),
            iss: config.jwt_issuer().to_owned(),
            aud: config.jwt_audience().to_owned(),
            iat,
            exp: iat + config.jwt_expiry_minutes() * 60,
        }
    }
}

pub fn generate_session_token(
    user: &StoredUser,
    config: &Config,
) -> Result<String, jsonwebtoken::errors::Error> {
    encode_claims(&SessionClaims::for_user(user, config), config)
}

pub(crate) fn encode_claims(
    claims: &SessionClaims,
    config: &Config,
) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(config.jwt_secret().as_bytes()),
    )
}

/// Validate a session JWT and return its claims, or a human-readable reason.
pub fn validate_session_token(token: &str, config: &Config) -> Result<SessionClaims, String> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[config.jwt_issuer()]);
    validation.set_audience(&[config.jwt_audience()]);
    validation.validate_exp = true;

    let token_data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret().as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => "Token has expired".to_owned(),
        jsonwebtoken::errors::ErrorKind::InvalidSignature => "Invalid token signature".to_owned(),
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => "Invalid token issuer".to_owned(),
        jsonwebtoken::errors::ErrorKind::InvalidAudience => "Invalid token audience".to_owned(),
        _ => format!("Token validation failed: {e}"),
    })?;

    Ok(token_data.claims)
}

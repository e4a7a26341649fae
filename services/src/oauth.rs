//! External identity providers (Google and GitHub).
//!
//! The client does the browser half of the OAuth dance and hands us either an
//! access token or, for GitHub, the authorization code. We resolve that into
//! an [`ExternalProfile`].

use crate::config::{Config, GithubOAuthConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_AGENT: &str = concat!("inventory-services/", env!("CARGO_PKG_VERSION"));

pub const GOOGLE: &str = "Google";
pub const GITHUB: &str = "GitHub";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Invalid {0} token")]
    InvalidToken(&'static str),

    #[error("Could not retrieve user information from {0}")]
    MissingProfile(&'static str),

    #[error("Could not retrieve email from GitHub. Please make sure your email is public or verified.")]
    MissingEmail,

    #[error("Failed to exchange GitHub code")]
    ExchangeFailed,

    #[error("GitHub sign-in is not configured")]
    NotConfigured,

    #[error("Provider request failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for OAuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Identity resolved from a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    pub provider: &'static str,
    pub provider_id: String,
    pub email: String,
    pub username: String,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    async fn google_user(&self, access_token: &str) -> Result<ExternalProfile, OAuthError>;

    async fn github_user(&self, access_token: &str) -> Result<ExternalProfile, OAuthError>;

    /// Trades an authorization code for a GitHub access token.
    async fn exchange_github_code(&self, code: &str) -> Result<String, OAuthError>;
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
}

impl GoogleUserInfo {
    fn into_profile(self) -> Result<ExternalProfile, OAuthError> {
        let email = non_empty(self.email).ok_or(OAuthError::MissingProfile(GOOGLE))?;
        let username =
            non_empty(self.name).unwrap_or_else(|| email_local_part(&email).to_owned());
        Ok(ExternalProfile {
            provider: GOOGLE,
            provider_id: self.sub,
            email,
            username,
        })
    }
}

#[derive(Deserialize)]
struct GithubUserInfo {
    id: i64,
    login: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Deserialize)]
struct GithubTokenResponse {
    access_token: Option<String>,
}

impl GithubUserInfo {
    fn into_profile(self, fallback_email: Option<String>) -> Result<ExternalProfile, OAuthError> {
        let email = non_empty(self.email)
            .or(fallback_email)
            .ok_or(OAuthError::MissingEmail)?;
        let username = non_empty(self.login)
            .or_else(|| non_empty(self.name))
            .unwrap_or_else(|| email_local_part(&email).to_owned());
        Ok(ExternalProfile {
            provider: GITHUB,
            provider_id: self.id.to_string(),
            email,
            username,
        })
    }
}

/// Talks to the real provider endpoints.
pub struct ReqwestOAuthProvider {
    client: Client,
    github: Option<GithubOAuthConfig>,
    redirect_uri: String,
}

impl ReqwestOAuthProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            github: config.github().cloned(),
            redirect_uri: format!("{}/oauth-callback", config.app_base_url()),
        }
    }

    async fn github_primary_email(&self, access_token: &str) -> Result<Option<String>, OAuthError> {
        let response = self
            .client
            .get(GITHUB_EMAILS_URL)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "GitHub email lookup failed");
            return Ok(None);
        }

        let emails: Vec<GithubEmail> = response.json().await?;
        Ok(emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email))
    }
}

#[async_trait]
impl OAuthProvider for ReqwestOAuthProvider {
    async fn google_user(&self, access_token: &str) -> Result<ExternalProfile, OAuthError> {
        let response = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Google token validation failed");
            return Err(OAuthError::InvalidToken(GOOGLE));
        }

        response.json::<GoogleUserInfo>().await?.into_profile()
    }

    async fn github_user(&self, access_token: &str) -> Result<ExternalProfile, OAuthError> {
        let response = self
            .client
            .get(GITHUB_USER_URL)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "GitHub token validation failed");
            return Err(OAuthError::InvalidToken(GITHUB));
        }

        let info: GithubUserInfo = response.json().await?;
        let fallback = if non_empty(info.email.clone()).is_none() {
            self.github_primary_email(access_token).await?
        } else {
            None
        };
        info.into_profile(fallback)
    }

    async fn exchange_github_code(&self, code: &str) -> Result<String, OAuthError> {
        let github = self.github.as_ref().ok_or(OAuthError::NotConfigured)?;

        let form = HashMap::from([
            ("client_id", github.client_id.as_str()),
            ("client_secret", github.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ]);

        let response = self
            .client
            .post(GITHUB_TOKEN_URL)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "GitHub code exchange failed");
            return Err(OAuthError::ExchangeFailed);
        }

        let body: GithubTokenResponse = response.json().await?;
        non_empty(body.access_token).ok_or(OAuthError::ExchangeFailed)
    }
}

/// Resolves tokens from a fixed table.
#[derive(Clone, Default)]
pub struct MockOAuthProvider {
    profiles: Arc<RwLock<HashMap<String, ExternalProfile>>>,
    codes: Arc<RwLock<HashMap<String, String>>>,
}

impl MockOAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a profile returned for `access_token` by either provider
    /// lookup whose provider name matches.
    pub fn with_profile(self, access_token: impl Into<String>, profile: ExternalProfile) -> Self {
        self.profiles
            .write()
            .expect("lock poisoned")
            .insert(access_token.into(), profile);
        self
    }

    pub fn with_github_code(self, code: impl Into<String>, access_token: impl Into<String>) -> Self {
        self.codes
            .write()
            .expect("lock poisoned")
            .insert(code.into(), access_token.into());
        self
    }

    fn lookup(&self, provider: &'static str, token: &str) -> Result<ExternalProfile, OAuthError> {
        self.profiles
            .read()
            .expect("lock poisoned")
            .get(token)
            .filter(|p| p.provider == provider)
            .cloned()
            .ok_or(OAuthError::InvalidToken(provider))
    }
}

#[async_trait]
impl OAuthProvider for MockOAuthProvider {
    async fn google_user(&self, access_token: &str) -> Result<ExternalProfile, OAuthError> {
        self.lookup(GOOGLE, access_token)
    }

    async fn github_user(&self, access_token: &str) -> Result<ExternalProfile, OAuthError> {
        self.lookup(GITHUB, access_token)
    }

    async fn exchange_github_code(&self, code: &str) -> Result<String, OAuthError> {
        self.codes
            .read()
            .expect("lock poisoned")
            .get(code)
            .cloned()
            .ok_or(OAuthError::ExchangeFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_username_falls_back_to_email() {
        let info = GoogleUserInfo {
            sub: "g-1".into(),
            email: Some("jane.doe@gmail.com".into()),
            name: Some("  ".into()),
        };
        let profile = info.into_profile().unwrap();
        assert_eq!(profile.username, "jane.doe");
        assert_eq!(profile.provider, GOOGLE);
    }

    #[test]
    fn google_without_email_is_rejected() {
        let info = GoogleUserInfo {
            sub: "g-1".into(),
            email: None,
            name: Some("Jane".into()),
        };
        assert!(matches!(
            info.into_profile(),
            Err(OAuthError::MissingProfile(GOOGLE))
        ));
    }

    #[test]
    fn github_prefers_login_then_name() {
        let info = GithubUserInfo {
            id: 42,
            login: None,
            email: None,
            name: Some("Octo Cat".into()),
        };
        let profile = info
            .into_profile(Some("octo@github.com".into()))
            .unwrap();
        assert_eq!(profile.username, "Octo Cat");
        assert_eq!(profile.email, "octo@github.com");
        assert_eq!(profile.provider_id, "42");

        let info = GithubUserInfo {
            id: 42,
            login: Some("octocat".into()),
            email: Some("o@x.io".into()),
            name: None,
        };
        assert_eq!(info.into_profile(None).unwrap().username, "octocat");
    }

    #[test]
    fn github_without_any_email_is_rejected() {
        let info = GithubUserInfo {
            id: 1,
            login: Some("x".into()),
            email: Some(String::new()),
            name: None,
        };
        assert!(matches!(
            info.into_profile(None),
            Err(OAuthError::MissingEmail)
        ));
    }

    #[tokio::test]
    async fn mock_checks_provider() {
        let provider = MockOAuthProvider::new().with_profile(
            "tok",
            ExternalProfile {
                provider: GITHUB,
                provider_id: "7".into(),
                email: "a@b.c".into(),
                username: "a".into(),
            },
        );
        assert!(provider.github_user("tok").await.is_ok());
        assert!(provider.google_user("tok").await.is_err());
    }

    #[tokio::test]
    async fn exchange_requires_github_config() {
        let provider = ReqwestOAuthProvider::new(&Config::new_for_test());
        assert!(matches!(
            provider.exchange_github_code("code").await,
            Err(OAuthError::NotConfigured)
        ));
    }
}

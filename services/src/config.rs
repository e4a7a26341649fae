use inventory_utils::version_info::RuntimeEnv;
use serde::Deserialize;
use std::env::vars;
use std::fmt::Display;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub enum Env {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "prod")]
    Prod,
    #[serde(rename = "internal")]
    Internal,
    #[serde(rename = "test")]
    Test,
    #[serde(rename = "test-internal")]
    TestInternal,
    #[serde(rename = "pr")]
    Pr,
    #[serde(rename = "nightly")]
    Nightly,
}

impl From<&Env> for RuntimeEnv {
    fn from(env: &Env) -> Self {
        match env {
            Env::Local => RuntimeEnv::Local,
            Env::Prod => RuntimeEnv::Prod,
            Env::Internal => RuntimeEnv::Internal,
            Env::Test => RuntimeEnv::Test,
            Env::TestInternal => RuntimeEnv::TestInternal,
            Env::Pr => RuntimeEnv::Pr,
            Env::Nightly => RuntimeEnv::Nightly,
        }
    }
}

impl Display for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Env::Local => write!(f, "local"),
            Env::Prod => write!(f, "prod"),
            Env::Internal => write!(f, "internal"),
            Env::Test => write!(f, "test"),
            Env::TestInternal => write!(f, "test-internal"),
            Env::Pr => write!(f, "pr"),
            Env::Nightly => write!(f, "nightly"),
        }
    }
}

const DEFAULT_JWT_ISSUER: &str = "inventory-services";
const DEFAULT_JWT_AUDIENCE: &str = "inventory-clients";
const DEFAULT_JWT_EXPIRY_MINUTES: i64 = 24 * 60;
const DEFAULT_APP_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SALESFORCE_TOKEN_ENDPOINT: &str = "https://login.salesforce.com/services/oauth2/token";
const DEFAULT_SALESFORCE_API_VERSION: &str = "v59.0";

/// SMTP settings. Present only when `SMTP_HOST` is configured.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
    pub from_name: String,
}

/// GitHub OAuth application credentials for the code exchange.
#[derive(Debug, Clone)]
pub struct GithubOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Salesforce connected-app settings for the password grant.
#[derive(Debug, Clone)]
pub struct SalesforceConfig {
    pub instance_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub security_token: String,
    pub token_endpoint: String,
    pub api_version: String,
}

/// Cloudflare R2 bucket used for inventory images.
#[derive(Debug, Clone)]
pub struct ImageBucketConfig {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub public_base_url: String,
}

// The final, validated configuration struct.
#[derive(Debug, Clone)]
pub struct Config {
    env: Env,
    database_url: String,
    server_addr: String,
    port: u16,
    run_migrations: bool,
    app_base_url: String,
    jwt_secret: String,
    jwt_issuer: String,
    jwt_audience: String,
    jwt_expiry_minutes: i64,
    smtp: Option<SmtpConfig>,
    github: Option<GithubOAuthConfig>,
    salesforce: Option<SalesforceConfig>,
    image_bucket: Option<ImageBucketConfig>,
}

// Intermediate struct for deserializing environment variables.
#[derive(Deserialize)]
struct RawConfig {
    env: Env,
    database_url: String,
    server_addr: Option<String>,
    port: Option<u16>,
    run_migrations: Option<bool>,
    app_base_url: Option<String>,
    jwt_secret: Option<String>,
    jwt_issuer: Option<String>,
    jwt_audience: Option<String>,
    jwt_expiry_minutes: Option<i64>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    email_from: Option<String>,
    email_from_name: Option<String>,
    github_client_id: Option<String>,
    github_client_secret: Option<String>,
    salesforce_instance_url: Option<String>,
    salesforce_client_id: Option<String>,
    salesforce_client_secret: Option<String>,
    salesforce_username: Option<String>,
    salesforce_password: Option<String>,
    salesforce_security_token: Option<String>,
    salesforce_token_endpoint: Option<String>,
    salesforce_api_version: Option<String>,
    cf_account_id: Option<String>,
    cf_access_key_id: Option<String>,
    cf_secret_access_key: Option<String>,
    cf_bucket: Option<String>,
    image_public_base_url: Option<String>,
}

impl Config {
    /// Create a test configuration with default values.
    ///
    /// Available to unit and integration tests. Not for production use.
    pub fn new_for_test() -> Self {
        Self {
            env: Env::Local,
            database_url: "postgres://localhost:5432/test".to_owned(),
            server_addr: "127.0.0.1".to_owned(),
            port: 8080,
            run_migrations: false,
            app_base_url: DEFAULT_APP_BASE_URL.to_owned(),
            jwt_secret: "test-jwt-secret-key-for-local-development".to_owned(),
            jwt_issuer: DEFAULT_JWT_ISSUER.to_owned(),
            jwt_audience: DEFAULT_JWT_AUDIENCE.to_owned(),
            jwt_expiry_minutes: DEFAULT_JWT_EXPIRY_MINUTES,
            smtp: None,
            github: None,
            salesforce: None,
            image_bucket: None,
        }
    }

    #[cfg(test)]
    pub fn new_for_test_with_env(env: Env) -> Self {
        Self {
            env,
            ..Self::new_for_test()
        }
    }

    pub fn environment(&self) -> &Env {
        &self.env
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_local(&self) -> bool {
        matches!(self.env, Env::Local)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self.env, Env::Prod)
    }

    pub fn run_migrations(&self) -> bool {
        self.run_migrations
    }

    /// Public base URL of the web client, used to build links in emails and
    /// the OAuth redirect URI.
    pub fn app_base_url(&self) -> &str {
        &self.app_base_url
    }

    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    pub fn jwt_issuer(&self) -> &str {
        &self.jwt_issuer
    }

    pub fn jwt_audience(&self) -> &str {
        &self.jwt_audience
    }

    pub fn jwt_expiry_minutes(&self) -> i64 {
        self.jwt_expiry_minutes
    }

    pub fn smtp(&self) -> Option<&SmtpConfig> {
        self.smtp.as_ref()
    }

    pub fn github(&self) -> Option<&GithubOAuthConfig> {
        self.github.as_ref()
    }

    pub fn salesforce(&self) -> Option<&SalesforceConfig> {
        self.salesforce.as_ref()
    }

    pub fn image_bucket(&self) -> Option<&ImageBucketConfig> {
        self.image_bucket.as_ref()
    }

    /// Initializes configuration by reading from environment variables
    /// and applying environment-aware defaults.
    pub fn init() -> anyhow::Result<Self> {
        info!("Loading configuration from environment variables");

        let raw_config: RawConfig = serde_env::from_iter(vars())?;
        Self::from_raw(raw_config)
    }

    fn from_raw(raw_config: RawConfig) -> anyhow::Result<Self> {
        let RawConfig {
            env,
            database_url,
            server_addr,
            port,
            run_migrations,
            app_base_url,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            email_from,
            email_from_name,
            github_client_id,
            github_client_secret,
            salesforce_instance_url,
            salesforce_client_id,
            salesforce_client_secret,
            salesforce_username,
            salesforce_password,
            salesforce_security_token,
            salesforce_token_endpoint,
            salesforce_api_version,
            cf_account_id,
            cf_access_key_id,
            cf_secret_access_key,
            cf_bucket,
            image_public_base_url,
        } = raw_config;

        let server_addr = match server_addr {
            Some(addr) => {
                info!("Using provided SERVER_ADDR: {}", addr);
                addr
            }
            None => {
                let default_addr = match env {
                    Env::Local => "127.0.0.1",
                    _ => "0.0.0.0",
                };
                info!(
                    "SERVER_ADDR not set, defaulting to {} for {} environment",
                    default_addr, env
                );
                default_addr.to_owned()
            }
        };

        let port = match port {
            Some(port) => port,
            None if matches!(env, Env::Local) => {
                info!("PORT not set, defaulting to 8080 for local environment");
                8080
            }
            None => anyhow::bail!("PORT must be set for {} environment", env),
        };

        let jwt_secret = match jwt_secret {
            Some(secret) => secret,
            None if matches!(env, Env::Local | Env::Test | Env::TestInternal) => {
                info!("JWT_SECRET not set, using default for {} environment", env);
                "default-jwt-secret-for-local-development-only".to_owned()
            }
            None => anyhow::bail!("JWT_SECRET must be set for {} environment", env),
        };

        let jwt_expiry_minutes = jwt_expiry_minutes.unwrap_or(DEFAULT_JWT_EXPIRY_MINUTES);
        if jwt_expiry_minutes <= 0 {
            anyhow::bail!("JWT_EXPIRY_MINUTES must be positive, got {jwt_expiry_minutes}");
        }

        let app_base_url = app_base_url
            .unwrap_or_else(|| DEFAULT_APP_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();

        let smtp = match smtp_host {
            Some(host) => {
                let Some(from_email) = email_from else {
                    anyhow::bail!("EMAIL_FROM must be set when SMTP_HOST is configured");
                };
                Some(SmtpConfig {
                    host,
                    port: smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
                    username: smtp_username,
                    password: smtp_password,
                    from_email,
                    from_name: email_from_name.unwrap_or_else(|| "Inventory".to_owned()),
                })
            }
            None => {
                info!("SMTP_HOST not set, verification emails are logged only");
                None
            }
        };

        let github = match (github_client_id, github_client_secret) {
            (Some(client_id), Some(client_secret)) => Some(GithubOAuthConfig {
                client_id,
                client_secret,
            }),
            (None, None) => None,
            _ => anyhow::bail!("GITHUB_CLIENT_ID and GITHUB_CLIENT_SECRET must be set together"),
        };

        let salesforce = match (
            salesforce_instance_url,
            salesforce_client_id,
            salesforce_client_secret,
            salesforce_username,
            salesforce_password,
        ) {
            (
                Some(instance_url),
                Some(client_id),
                Some(client_secret),
                Some(username),
                Some(password),
            ) => Some(SalesforceConfig {
                instance_url: instance_url.trim_end_matches('/').to_owned(),
                client_id,
                client_secret,
                username,
                password,
                security_token: salesforce_security_token.unwrap_or_default(),
                token_endpoint: salesforce_token_endpoint
                    .unwrap_or_else(|| DEFAULT_SALESFORCE_TOKEN_ENDPOINT.to_owned()),
                api_version: salesforce_api_version
                    .unwrap_or_else(|| DEFAULT_SALESFORCE_API_VERSION.to_owned()),
            }),
            _ => {
                info!("Salesforce settings incomplete, CRM sync disabled");
                None
            }
        };

        let image_bucket = match (cf_account_id, cf_access_key_id, cf_secret_access_key, cf_bucket)
        {
            (Some(account_id), Some(access_key_id), Some(secret_access_key), Some(bucket)) => {
                let public_base_url = image_public_base_url
                    .unwrap_or_else(|| format!("https://{bucket}.{account_id}.r2.dev"))
                    .trim_end_matches('/')
                    .to_owned();
                Some(ImageBucketConfig {
                    account_id,
                    access_key_id,
                    secret_access_key,
                    bucket,
                    public_base_url,
                })
            }
            _ if matches!(env, Env::Prod) => {
                anyhow::bail!(
                    "CF_ACCOUNT_ID, CF_ACCESS_KEY_ID, CF_SECRET_ACCESS_KEY and CF_BUCKET must be set for {} environment",
                    env
                );
            }
            _ => None,
        };

        Ok(Config {
            env,
            database_url,
            server_addr,
            port,
            run_migrations: run_migrations.unwrap_or(false),
            app_base_url,
            jwt_secret,
            jwt_issuer: jwt_issuer.unwrap_or_else(|| DEFAULT_JWT_ISSUER.to_owned()),
            jwt_audience: jwt_audience.unwrap_or_else(|| DEFAULT_JWT_AUDIENCE.to_owned()),
            jwt_expiry_minutes,
            smtp,
            github,
            salesforce,
            image_bucket,
        })
    }

    /// Returns a copy with Salesforce settings, for tests that exercise CRM routes.
    pub fn with_salesforce(mut self, salesforce: SalesforceConfig) -> Self {
        self.salesforce = Some(salesforce);
        self
    }
}

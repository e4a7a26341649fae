//! Salesforce account sync.
//!
//! A user can be mirrored into the CRM once: an Account (named after the
//! company, or the person) plus a Contact linked to it. The resulting ids are
//! stored on the user so a second sync is refused.

use crate::config::SalesforceConfig;
use crate::users::storage::{StoredUser, UserStorage, UserStorageError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::RwLock;

const TOKEN_TTL_MINUTES: i64 = 55;

#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("Salesforce authentication failed: {0}")]
    Auth(String),

    #[error("Salesforce request failed: {0}")]
    Request(String),

    #[error("Salesforce rejected the record: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for CrmError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Phone", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "BillingStreet", skip_serializing_if = "Option::is_none")]
    pub billing_street: Option<String>,
    #[serde(rename = "BillingCity", skip_serializing_if = "Option::is_none")]
    pub billing_city: Option<String>,
    #[serde(rename = "BillingState", skip_serializing_if = "Option::is_none")]
    pub billing_state: Option<String>,
    #[serde(rename = "BillingPostalCode", skip_serializing_if = "Option::is_none")]
    pub billing_postal_code: Option<String>,
    #[serde(rename = "BillingCountry", skip_serializing_if = "Option::is_none")]
    pub billing_country: Option<String>,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mailing_street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mailing_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mailing_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mailing_postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mailing_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Returns the new Account id.
    async fn create_account(&self, request: &AccountRequest) -> Result<String, CrmError>;

    /// Returns the new Contact id.
    async fn create_contact(&self, request: &ContactRequest) -> Result<String, CrmError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    instance_url: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    instance_url: Option<String>,
}

#[derive(Deserialize)]
struct CreateResponse {
    id: Option<String>,
    success: bool,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

/// Salesforce REST client using the OAuth password grant.
pub struct SalesforceClient {
    client: Client,
    config: SalesforceConfig,
    token: RwLock<Option<CachedToken>>,
}

impl SalesforceClient {
    pub fn new(config: SalesforceConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            token: RwLock::new(None),
        }
    }

    async fn access_token(&self) -> Result<CachedToken, CrmError> {
        if let Some(token) = self.token.read().await.as_ref()
            && Utc::now() < token.expires_at
        {
            return Ok(token.clone());
        }

        let mut slot = self.token.write().await;
        // Another request may have refreshed while we waited for the lock.
        if let Some(token) = slot.as_ref()
            && Utc::now() < token.expires_at
        {
            return Ok(token.clone());
        }

        let password = format!("{}{}", self.config.password, self.config.security_token);
        let form = [
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("username", self.config.username.as_str()),
            ("password", password.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_endpoint)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!(%status, body = %body, "Salesforce authentication failed");
            return Err(CrmError::Auth(body));
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| CrmError::Auth(e.to_string()))?;
        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CrmError::Auth("Invalid token response from Salesforce".to_owned()))?;

        let token = CachedToken {
            access_token,
            instance_url: parsed
                .instance_url
                .unwrap_or_else(|| self.config.instance_url.clone()),
            expires_at: Utc::now() + Duration::minutes(TOKEN_TTL_MINUTES),
        };
        *slot = Some(token.clone());
        Ok(token)
    }

    async fn create_sobject<T: Serialize + Sync>(
        &self,
        object: &str,
        body: &T,
    ) -> Result<String, CrmError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/services/data/{}/sobjects/{object}",
            token.instance_url.trim_end_matches('/'),
            self.config.api_version
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&token.access_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!(object, %status, body = %text, "Salesforce create failed");
            return Err(CrmError::Rejected(text));
        }

        let created: CreateResponse =
            serde_json::from_str(&text).map_err(|e| CrmError::Request(e.to_string()))?;
        match created.id {
            Some(id) if created.success => Ok(id),
            _ => Err(CrmError::Rejected(format!("{:?}", created.errors))),
        }
    }
}

#[async_trait]
impl CrmClient for SalesforceClient {
    async fn create_account(&self, request: &AccountRequest) -> Result<String, CrmError> {
        self.create_sobject("Account", request).await
    }

    async fn create_contact(&self, request: &ContactRequest) -> Result<String, CrmError> {
        self.create_sobject("Contact", request).await
    }
}

/// In-memory CRM. Ids are sequential; either call can be made to fail.
#[derive(Clone, Default)]
pub struct MockCrmClient {
    state: Arc<StdRwLock<MockCrmState>>,
}

#[derive(Default)]
struct MockCrmState {
    accounts: Vec<AccountRequest>,
    contacts: Vec<ContactRequest>,
    fail_accounts: bool,
    fail_contacts: bool,
}

impl MockCrmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_accounts(self) -> Self {
        self.state.write().expect("lock poisoned").fail_accounts = true;
        self
    }

    pub fn failing_contacts(self) -> Self {
        self.state.write().expect("lock poisoned").fail_contacts = true;
        self
    }

    pub fn accounts(&self) -> Vec<AccountRequest> {
        self.state.read().expect("lock poisoned").accounts.clone()
    }

    pub fn contacts(&self) -> Vec<ContactRequest> {
        self.state.read().expect("lock poisoned").contacts.clone()
    }
}

#[async_trait]
impl CrmClient for MockCrmClient {
    async fn create_account(&self, request: &AccountRequest) -> Result<String, CrmError> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.fail_accounts {
            return Err(CrmError::Rejected("account rejected".to_owned()));
        }
        state.accounts.push(request.clone());
        Ok(format!("001{:015}", state.accounts.len()))
    }

    async fn create_contact(&self, request: &ContactRequest) -> Result<String, CrmError> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.fail_contacts {
            return Err(CrmError::Rejected("contact rejected".to_owned()));
        }
        state.contacts.push(request.clone());
        Ok(format!("003{:015}", state.contacts.len()))
    }
}

/// Body of a sync request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrmSyncInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
}

impl CrmSyncInput {
    fn account_request(&self) -> AccountRequest {
        let name = match self.company.as_deref().map(str::trim) {
            Some(company) if !company.is_empty() => company.to_owned(),
            _ => format!("{} {}", self.first_name, self.last_name),
        };
        AccountRequest {
            name,
            phone: self.phone.clone(),
            billing_street: self.street.clone(),
            billing_city: self.city.clone(),
            billing_state: self.state.clone(),
            billing_postal_code: self.postal_code.clone(),
            billing_country: self.country.clone(),
            description: self.description.clone(),
        }
    }

    fn contact_request(&self, account_id: &str) -> ContactRequest {
        ContactRequest {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            title: self.job_title.clone(),
            account_id: account_id.to_owned(),
            mailing_street: self.street.clone(),
            mailing_city: self.city.clone(),
            mailing_state: self.state.clone(),
            mailing_postal_code: self.postal_code.clone(),
            mailing_country: self.country.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrmSyncResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    pub message: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrmStatus {
    pub username: String,
    pub email: String,
    pub is_synced: bool,
    pub account_id: Option<String>,
    pub contact_id: Option<String>,
}

impl From<&StoredUser> for CrmStatus {
    fn from(user: &StoredUser) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            is_synced: is_synced(user),
            account_id: user.crm_account_id.clone(),
            contact_id: user.crm_contact_id.clone(),
        }
    }
}

pub fn is_synced(user: &StoredUser) -> bool {
    user.crm_account_id.as_deref().is_some_and(|id| !id.is_empty())
        && user.crm_contact_id.as_deref().is_some_and(|id| !id.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum CrmSyncError {
    #[error("User already has a Salesforce Account and Contact")]
    AlreadySynced,

    #[error(transparent)]
    Storage(#[from] UserStorageError),
}

/// Creates the Account and Contact for `user` and stores their ids.
///
/// CRM failures are reported inside the result, not as errors.
pub async fn sync_user<U: UserStorage>(
    crm: &dyn CrmClient,
    users: &U,
    user: &StoredUser,
    input: &CrmSyncInput,
) -> Result<CrmSyncResult, CrmSyncError> {
    if is_synced(user) {
        return Err(CrmSyncError::AlreadySynced);
    }

    let account_id = match crm.create_account(&input.account_request()).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to create Salesforce Account");
            return Ok(CrmSyncResult {
                message: "Failed to create Salesforce Account".to_owned(),
                errors: vec![e.to_string()],
                ..CrmSyncResult::default()
            });
        }
    };

    let contact_id = match crm
        .create_contact(&input.contact_request(&account_id))
        .await
    {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to create Salesforce Contact");
            return Ok(CrmSyncResult {
                account_id: Some(account_id),
                message: "Account created but Contact creation failed".to_owned(),
                errors: vec![e.to_string()],
                ..CrmSyncResult::default()
            });
        }
    };

    users.set_crm_ids(user.id, &account_id, &contact_id).await?;
    tracing::info!(user_id = %user.id, %account_id, %contact_id, "User synced to Salesforce");

    Ok(CrmSyncResult {
        success: true,
        account_id: Some(account_id),
        contact_id: Some(contact_id),
        message: "Successfully created Account and Contact in Salesforce".to_owned(),
        errors: Vec::new(),
    })
}

//! Shared application state.

use crate::catalog::Catalog;
use crate::config::Config;
use crate::crm::{CrmClient, MockCrmClient, SalesforceClient};
use crate::database::SqlStorage;
use crate::email::{Mailer, RecordingMailer, mailer_from_config};
use crate::images::{ImageStore, MockImageStore, image_store_from_config};
use crate::oauth::{MockOAuthProvider, OAuthProvider, ReqwestOAuthProvider};
use crate::users::storage::UserStorage;
use std::sync::Arc;

/// Outbound services. The CRM is absent when Salesforce isn't configured.
#[derive(Clone)]
pub struct Integrations {
    pub mailer: Arc<dyn Mailer>,
    pub oauth: Arc<dyn OAuthProvider>,
    pub crm: Option<Arc<dyn CrmClient>>,
    pub images: Arc<dyn ImageStore>,
}

impl Integrations {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let crm = config.salesforce().map(|salesforce| {
            Arc::new(SalesforceClient::new(salesforce.clone())) as Arc<dyn CrmClient>
        });
        if crm.is_none() {
            tracing::warn!("Salesforce settings incomplete, CRM endpoints are disabled");
        }

        Ok(Self {
            mailer: mailer_from_config(config)?,
            oauth: Arc::new(ReqwestOAuthProvider::new(config)),
            crm,
            images: image_store_from_config(config),
        })
    }

    /// In-memory integrations with no CRM.
    pub fn for_test() -> Self {
        Self {
            mailer: Arc::new(RecordingMailer::new()),
            oauth: Arc::new(MockOAuthProvider::new()),
            crm: None,
            images: Arc::new(MockImageStore),
        }
    }

    pub fn with_mailer(mut self, mailer: impl Mailer + 'static) -> Self {
        self.mailer = Arc::new(mailer);
        self
    }

    pub fn with_oauth(mut self, oauth: impl OAuthProvider + 'static) -> Self {
        self.oauth = Arc::new(oauth);
        self
    }

    pub fn with_crm(mut self, crm: MockCrmClient) -> Self {
        self.crm = Some(Arc::new(crm));
        self
    }
}

/// Combined application state for routes that need both SQL and User storage.
#[derive(Clone)]
pub struct AppState<S, U> {
    pub sql_storage: S,
    pub user_storage: U,
    pub integrations: Integrations,
}

impl<S, U> AppState<S, U> {
    pub fn new(sql_storage: S, user_storage: U, integrations: Integrations) -> Self {
        Self {
            sql_storage,
            user_storage,
            integrations,
        }
    }
}

impl<S: SqlStorage, U: UserStorage> AppState<S, U> {
    pub fn catalog(&self) -> Catalog<'_, S, U> {
        Catalog::new(&self.sql_storage, &self.user_storage)
    }
}

//! Verification email delivery.
//!
//! [`SmtpMailer`] sends through an SMTP relay; [`ConsoleMailer`] only logs the
//! link and is used when no relay is configured. [`RecordingMailer`] keeps the
//! messages in memory for tests.

use crate::config::{Config, SmtpConfig};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::{Arc, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to send email: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_email(
        &self,
        to: &str,
        username: &str,
        link: &str,
    ) -> Result<(), EmailError>;
}

/// Picks the SMTP mailer when a relay is configured, the console one otherwise.
pub fn mailer_from_config(config: &Config) -> anyhow::Result<Arc<dyn Mailer>> {
    match config.smtp() {
        Some(smtp) => Ok(Arc::new(SmtpMailer::new(smtp)?)),
        None => {
            tracing::warn!("SMTP_HOST not set, verification emails will only be logged");
            Ok(Arc::new(ConsoleMailer))
        }
    }
}

fn verification_body(username: &str, link: &str) -> String {
    format!(
        r#"
<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; padding: 20px;">
    <div style="max-width: 600px; margin: 0 auto; background-color: #f8f9fa; padding: 30px; border-radius: 10px;">
        <h2 style="color: #333;">Welcome to Inventory, {username}!</h2>
        <p style="color: #666; font-size: 16px;">
            Thank you for registering. Please verify your email address by clicking the button below:
        </p>
        <p style="text-align: center; margin: 30px 0;">
            <a href="{link}"
               style="background-color: #0d6efd; color: white; padding: 12px 30px; text-decoration: none; border-radius: 5px; display: inline-block;">
                Verify Email
            </a>
        </p>
        <p style="color: #999; font-size: 14px;">
            Or copy and paste this link into your browser:<br>
            <a href="{link}" style="color: #0d6efd;">{link}</a>
        </p>
        <p style="color: #999; font-size: 14px; margin-top: 30px;">This link will expire in 24 hours.</p>
        <p style="color: #999; font-size: 12px;">
            If you didn't create an account, you can safely ignore this email.
        </p>
    </div>
</body>
</html>
"#
    )
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: format!("{} <{}>", config.from_name, config.from_email),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification_email(
        &self,
        to: &str,
        username: &str,
        link: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| EmailError::Address(format!("{e}")))?,
            )
            .to(format!("{username} <{to}>")
                .parse()
                .map_err(|e| EmailError::Address(format!("{e}")))?)
            .subject("Verify your email address")
            .header(ContentType::TEXT_HTML)
            .body(verification_body(username, link))
            .map_err(|e| EmailError::Build(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        tracing::info!(to, "Verification email sent");
        Ok(())
    }
}

/// Logs verification links instead of sending them.
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send_verification_email(
        &self,
        to: &str,
        username: &str,
        link: &str,
    ) -> Result<(), EmailError> {
        tracing::info!(to, username, link, "Verification email (not sent)");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub username: String,
    pub link: String,
}

/// Keeps every message in memory.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<RwLock<Vec<SentEmail>>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.read().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_verification_email(
        &self,
        to: &str,
        username: &str,
        link: &str,
    ) -> Result<(), EmailError> {
        self.sent.write().expect("lock poisoned").push(SentEmail {
            to: to.to_owned(),
            username: username.to_owned(),
            link: link.to_owned(),
        });
        Ok(())
    }
}

//! Email delivery for verification and password-reset links
//!
//! The auth service builds an [`EmailMessage`] and hands it to an
//! [`EmailSender`]. [`LogEmailSender`] is the default for local development;
//! [`HttpEmailSender`] posts to a transactional email API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::models::User;

#[derive(Clone, Debug, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    /// Link the recipient is expected to follow
    pub action_url: String,
}

/// Email delivery abstraction
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            url = %message.action_url,
            "email send stub"
        );
        Ok(())
    }
}

/// Sender for JSON email APIs (`POST {from, to, subject, text}`)
///
/// Messages go out as plain text only, so user-supplied names never reach
/// an HTML body.
#[derive(Clone, Debug)]
pub struct HttpEmailSender {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpEmailSender {
    pub fn new(api_url: String, api_key: Option<String>, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let mut request = self.client.post(&self.api_url).json(&json!({
            "from": self.from,
            "to": [message.to],
            "subject": message.subject,
            "text": message.text,
        }));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.context("email API unreachable")?;
        if !response.status().is_success() {
            anyhow::bail!("email API rejected message: {}", response.status());
        }

        info!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}

/// Email transport configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

impl EmailConfig {
    /// Create a new EmailConfig from environment variables
    ///
    /// # Environment Variables
    /// - `EMAIL_API_URL`: email API endpoint; unset selects the logging sender
    /// - `EMAIL_API_KEY`: bearer token for the email API
    /// - `EMAIL_FROM` (default: "ExamMaster <no-reply@exammaster.app>")
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        Self {
            api_url: non_empty("EMAIL_API_URL"),
            api_key: non_empty("EMAIL_API_KEY"),
            from: non_empty("EMAIL_FROM")
                .unwrap_or_else(|| "ExamMaster <no-reply@exammaster.app>".to_string()),
        }
    }

    /// Build the sender this configuration selects
    pub fn sender(&self) -> Arc<dyn EmailSender> {
        match &self.api_url {
            Some(api_url) => Arc::new(HttpEmailSender::new(
                api_url.clone(),
                self.api_key.clone(),
                self.from.clone(),
            )),
            None => Arc::new(LogEmailSender),
        }
    }
}

pub fn verification_email(user: &User, url: &str) -> EmailMessage {
    EmailMessage {
        to: user.email.clone(),
        subject: "Verify your email address".to_string(),
        text: format!(
            "Hi {},\n\nClick the link below to verify your ExamMaster account:\n\n{url}\n",
            user.name
        ),
        action_url: url.to_string(),
    }
}

pub fn reset_password_email(user: &User, url: &str) -> EmailMessage {
    EmailMessage {
        to: user.email.clone(),
        subject: "Reset your password".to_string(),
        text: format!(
            "Hi {},\n\nClick the link below to choose a new password:\n\n{url}\n\nIf you did not ask for this, ignore this email.\n",
            user.name
        ),
        action_url: url.to_string(),
    }
}

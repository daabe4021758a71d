//! Mailer implementations.
//!
//! - [`SendGridMailer`]: delivers through the SendGrid v3 HTTP API
//! - [`LogMailer`]: development fallback that only logs the recipient
//!
//! [`build_mailer`] picks one from [`MailConfig`].

use crate::config::MailConfig;
use crate::constants::SENDGRID_SEND_URL;
use agora_core::{MailError, MailTemplate, Mailer, OutboundMail};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;

const USER_INVITATION_HTML: &str = include_str!("../templates/user_invitation.html");

/// Render a template body, replacing `{{name}}` placeholders with mail vars.
pub fn render_template(mail: &OutboundMail) -> String {
    let source = match mail.template {
        MailTemplate::UserInvitation => USER_INVITATION_HTML,
    };
    mail.vars
        .iter()
        .fold(source.to_string(), |body, (key, value)| {
            body.replace(&format!("{{{{{}}}}}", key), value)
        })
}

/// Build the mailer selected by configuration.
pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match &config.sendgrid_api_key {
        Some(key) => Ok(Arc::new(SendGridMailer::new(config, key.clone())?)),
        None => {
            tracing::warn!("AGORA_SENDGRID_API_KEY not set, invitation mails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

// ============================================================================
// SENDGRID
// ============================================================================

pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    from_email: String,
    from_name: String,
    max_retries: u32,
    backoff: Duration,
}

impl std::fmt::Debug for SendGridMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendGridMailer")
            .field("endpoint", &self.endpoint)
            .field("from_email", &self.from_email)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl SendGridMailer {
    pub fn new(config: &MailConfig, api_key: SecretString) -> Result<Self, MailError> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(MailError::InvalidConfig("SendGrid API key is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MailError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            endpoint: SENDGRID_SEND_URL.to_string(),
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
            max_retries: config.max_retries.max(1),
            backoff: Duration::from_secs(1),
        })
    }

    /// Override the API endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Base delay between attempts; attempt `n` waits `n * backoff`.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// SendGrid v3 request body.
    pub fn payload(&self, mail: &OutboundMail) -> serde_json::Value {
        serde_json::json!({
            "personalizations": [{
                "to": [{ "email": mail.recipient_email, "name": mail.recipient_name }]
            }],
            "from": { "email": self.from_email, "name": self.from_name },
            "subject": mail.template.subject(),
            "content": [{ "type": "text/html", "value": render_template(mail) }],
            "mail_settings": { "sandbox_mode": { "enable": mail.sandbox } }
        })
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| MailError::SendFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(MailError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        let body = self.payload(mail);
        let mut last_error = MailError::SendFailed("no attempt made".into());

        for attempt in 1..=self.max_retries {
            match self.send_once(&body).await {
                Ok(()) => {
                    tracing::info!(
                        template = mail.template.id(),
                        attempt,
                        sandbox = mail.sandbox,
                        "Mail sent"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_retries = self.max_retries,
                        template = mail.template.id(),
                        "Mail send attempt failed"
                    );
                    last_error = e;
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
            }
        }

        Err(last_error)
    }
}

// ============================================================================
// LOG ONLY
// ============================================================================

/// Never fails. Logs the recipient and template only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        tracing::info!(
            template = mail.template.id(),
            recipient = %mail.recipient_name,
            sandbox = mail.sandbox,
            "Mail delivery skipped (log mailer)"
        );
        Ok(())
    }
}

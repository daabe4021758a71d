//! Outbound mail seam.
//!
//! The lifecycle coordinator only knows this trait. Any error returned from
//! [`Mailer::send`] is treated as a total delivery failure.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MailError {
    #[error("Failed to send mail: {0}")]
    SendFailed(String),

    #[error("Mail provider rejected request with status {status}")]
    Rejected { status: u16 },

    #[error("Invalid mail configuration: {0}")]
    InvalidConfig(String),
}

/// Known mail templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailTemplate {
    UserInvitation,
}

impl MailTemplate {
    pub fn id(self) -> &'static str {
        match self {
            Self::UserInvitation => "user_invitation",
        }
    }

    pub fn subject(self) -> &'static str {
        match self {
            Self::UserInvitation => "Finish registration with Agora",
        }
    }
}

/// A fully addressed message awaiting delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub template: MailTemplate,
    pub recipient_name: String,
    pub recipient_email: String,
    pub vars: BTreeMap<String, String>,
    /// Provider accepts the request but does not deliver it.
    pub sandbox: bool,
}

impl OutboundMail {
    pub fn new(
        template: MailTemplate,
        recipient_name: impl Into<String>,
        recipient_email: impl Into<String>,
    ) -> Self {
        Self {
            template,
            recipient_name: recipient_name.into(),
            recipient_email: recipient_email.into(),
            vars: BTreeMap::new(),
            sandbox: false,
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// Mail delivery collaborator.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError>;
}

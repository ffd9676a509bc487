//! Email provider — SMTP sending via async lettre.
//!
//! Bodies are sent as HTML since the stock templates use simple markup;
//! mail clients render plain text inside HTML fine, the reverse is ugly.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};

use rollcall_core::config::EmailConfig;
use rollcall_core::types::ChannelKind;

use crate::{Message, Provider, SendError};

/// SMTP email provider.
pub struct EmailProvider {
    config: EmailConfig,
}

impl EmailProvider {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn is_configured(&self) -> bool {
        !self.config.smtp_host.is_empty() && !self.config.from_address.is_empty()
    }

    fn from_mailbox(&self) -> Result<Mailbox, SendError> {
        let formatted = match &self.config.from_name {
            Some(name) => format!("{name} <{}>", self.config.from_address),
            None => self.config.from_address.clone(),
        };
        formatted
            .parse()
            .map_err(|e| SendError::Permanent(format!("Invalid from address: {e}")))
    }
}

#[async_trait]
impl Provider for EmailProvider {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn channel(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn available(&self) -> bool {
        self.is_configured()
    }

    async fn send(&self, to: &str, message: &Message) -> Result<String, SendError> {
        if !self.is_configured() {
            return Err(SendError::Unavailable);
        }

        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| SendError::Permanent(format!("Invalid to address: {e}")))?;

        let email = LettreMessage::builder()
            .from(self.from_mailbox()?)
            .to(to_mailbox)
            .subject(&message.subject)
            .header(ContentType::TEXT_HTML)
            .body(message.body.clone())
            .map_err(|e| SendError::Permanent(format!("Build email: {e}")))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| SendError::Transient(format!("SMTP relay: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        let response = mailer.send(email).await.map_err(|e| {
            if e.is_permanent() {
                SendError::Permanent(format!("SMTP send: {e}"))
            } else {
                SendError::Transient(format!("SMTP send: {e}"))
            }
        })?;

        tracing::info!("📤 Email sent to: {to}");
        Ok(format!("{}", response.code()))
    }
}

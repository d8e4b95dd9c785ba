//! Mail relays.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, info};

use audiopipe_core::config::MailConfig;
use audiopipe_core::error::{AppError, ErrorKind};

/// Mail delivery errors.
#[derive(Debug, Error)]
pub enum MailError {
    /// A sender or recipient address could not be parsed.
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The offending address.
        address: String,
        /// Parser message.
        reason: String,
    },

    /// The message could not be assembled.
    #[error("Failed to build message: {0}")]
    Build(String),

    /// The relay rejected the message or could not be reached.
    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}

impl From<MailError> for AppError {
    fn from(err: MailError) -> Self {
        let kind = match &err {
            MailError::InvalidAddress { .. } => ErrorKind::Validation,
            MailError::Build(_) => ErrorKind::Internal,
            MailError::Transport(_) => ErrorKind::Mail,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}

fn parse_address(address: &str) -> Result<Address, MailError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|e| MailError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Delivers one plain-text message.
#[async_trait]
pub trait MailRelay: Send + Sync + std::fmt::Debug + 'static {
    /// Send `body` to `to` with `subject`.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// SMTP relay on lettre's tokio transport.
#[derive(Clone)]
pub struct SmtpRelay {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    host: String,
}

impl std::fmt::Debug for SmtpRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpRelay")
            .field("host", &self.host)
            .field("sender", &self.sender.to_string())
            .finish()
    }
}

impl SmtpRelay {
    /// Build a relay from configuration. No connection is made until the
    /// first send.
    pub fn new(config: &MailConfig) -> Result<Self, AppError> {
        let sender = Mailbox::new(None, parse_address(config.sender())?);

        let builder = match config.tls.to_ascii_lowercase().as_str() {
            "starttls" => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| AppError::configuration(format!("Invalid SMTP relay: {e}")))?,
            "implicit" | "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .map_err(|e| AppError::configuration(format!("Invalid SMTP relay: {e}")))?,
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host),
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown mail TLS mode: '{other}'. Supported: starttls, implicit, none"
                )));
            }
        };

        let mut builder = builder
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_seconds)));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        info!(
            host = %config.smtp_host,
            port = config.smtp_port,
            tls = %config.tls,
            "SMTP relay configured"
        );
        Ok(Self {
            transport: builder.build(),
            sender,
            host: config.smtp_host.clone(),
        })
    }
}

#[async_trait]
impl MailRelay for SmtpRelay {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let recipient = Mailbox::new(None, parse_address(to)?);
        let message = Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| MailError::Build(e.to_string()))?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        debug!(to = %to, code = %response.code(), "Mail accepted by relay");
        Ok(())
    }
}

/// Relay used when mail delivery is disabled: logs instead of sending.
#[derive(Debug, Clone, Default)]
pub struct LogRelay;

#[async_trait]
impl MailRelay for LogRelay {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), MailError> {
        parse_address(to)?;
        info!(to = %to, subject = %subject, "Mail delivery disabled, message logged");
        Ok(())
    }
}

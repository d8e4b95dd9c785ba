//! Mail relay and notification template configuration.

use serde::{Deserialize, Serialize};

/// SMTP relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Deliver through SMTP. When false, notifications are only logged.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// SMTP server host.
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    /// SMTP server port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username. Empty disables authentication.
    #[serde(default)]
    pub username: String,
    /// SMTP password.
    #[serde(default)]
    pub password: String,
    /// Sender address. Falls back to `username` when empty.
    #[serde(default)]
    pub from_address: String,
    /// TLS mode: `"starttls"`, `"implicit"` or `"none"`.
    #[serde(default = "default_tls")]
    pub tls: String,
    /// Per-message send timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Status-specific message templates.
    #[serde(default)]
    pub templates: TemplateConfig,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_address: String::new(),
            tls: default_tls(),
            timeout_seconds: default_timeout(),
            templates: TemplateConfig::default(),
        }
    }
}

impl MailConfig {
    /// The effective sender address.
    pub fn sender(&self) -> &str {
        if self.from_address.is_empty() {
            &self.username
        } else {
            &self.from_address
        }
    }
}

/// A subject line and a body with `{job_id}` / `{error}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Templates keyed by job status, plus a fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Sent when a job enters `processing`.
    #[serde(default = "default_processing")]
    pub processing: MessageTemplate,
    /// Sent when a job completes.
    #[serde(default = "default_completed")]
    pub completed: MessageTemplate,
    /// Sent when a job fails.
    #[serde(default = "default_failed")]
    pub failed: MessageTemplate,
    /// Used for any other status.
    #[serde(default = "default_fallback")]
    pub default: MessageTemplate,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            processing: default_processing(),
            completed: default_completed(),
            failed: default_failed(),
            default: default_fallback(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_tls() -> String {
    "starttls".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_processing() -> MessageTemplate {
    MessageTemplate {
        subject: "Video Conversion Started".to_string(),
        body: "Your video conversion has started.\n\
               Job ID: {job_id}\n\
               We'll notify you when it's complete.\n"
            .to_string(),
    }
}

fn default_completed() -> MessageTemplate {
    MessageTemplate {
        subject: "Video Conversion Completed".to_string(),
        body: "Your video has been successfully converted to MP3.\n\
               Job ID: {job_id}\n\
               You can now download your converted file.\n"
            .to_string(),
    }
}

fn default_failed() -> MessageTemplate {
    MessageTemplate {
        subject: "Video Conversion Failed".to_string(),
        body: "Sorry, we couldn't convert your video.\n\
               Job ID: {job_id}\n\
               Error: {error}\n\
               Please try again or contact support if the issue persists.\n"
            .to_string(),
    }
}

fn default_fallback() -> MessageTemplate {
    MessageTemplate {
        subject: "Video Conversion Update".to_string(),
        body: "Update on your video conversion. Job ID: {job_id}".to_string(),
    }
}

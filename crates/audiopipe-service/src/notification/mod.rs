//! Notification stage: render status emails and deliver them.

pub mod relay;
pub mod service;
pub mod template;

pub use relay::{LogRelay, MailError, MailRelay, SmtpRelay};
pub use service::{NotificationOutcome, NotificationService};
pub use template::{RenderedMail, render};

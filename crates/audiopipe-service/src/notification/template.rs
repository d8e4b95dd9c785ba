//! Status email templates.

use audiopipe_core::config::{MessageTemplate, TemplateConfig};
use audiopipe_entity::job::JobStatus;

/// Substituted for `{error}` when the message carries none.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// A rendered subject and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Pick the template for `status` and fill in the placeholders.
///
/// Unknown statuses use the fallback template.
pub fn render(templates: &TemplateConfig, status: &str, job_id: &str, error: Option<&str>) -> RenderedMail {
    let template = select(templates, status);
    let error = error.filter(|e| !e.is_empty()).unwrap_or(UNKNOWN_ERROR);
    RenderedMail {
        subject: fill(&template.subject, job_id, error),
        body: fill(&template.body, job_id, error),
    }
}

fn select<'a>(templates: &'a TemplateConfig, status: &str) -> &'a MessageTemplate {
    match status.parse::<JobStatus>() {
        Ok(JobStatus::Processing) => &templates.processing,
        Ok(JobStatus::Completed) => &templates.completed,
        Ok(JobStatus::Failed) => &templates.failed,
        Err(_) => &templates.default,
    }
}

fn fill(text: &str, job_id: &str, error: &str) -> String {
    text.replace("{job_id}", job_id).replace("{error}", error)
}

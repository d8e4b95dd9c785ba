//! Upload intake: validation, staging, job creation and work enqueueing.

pub mod service;
pub mod staging;
pub mod validation;

pub use service::{IntakeService, QUEUE_FAILURE};

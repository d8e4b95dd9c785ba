//! # audiopipe-service
//!
//! Business logic for the three pipeline stages:
//!
//! - [`intake`]: validate and stage uploads, create the job, enqueue work
//! - [`conversion`]: drive the job state machine around the media tool
//! - [`notification`]: render and deliver status emails
//!
//! Plus [`status`] queries over the job record store.

pub mod conversion;
pub mod fs;
pub mod intake;
pub mod notification;
pub mod status;

pub use conversion::ConversionService;
pub use intake::IntakeService;
pub use notification::NotificationService;
pub use status::StatusService;

//! Conversion stage: the job state machine around the media tool.

pub mod retry;
pub mod service;

pub use retry::RetryPolicy;
pub use service::{ConversionError, ConversionOutcome, ConversionService};

//! Conversion job domain entities.

pub mod model;
pub mod status;

pub use model::{ConversionJob, JobStatusView};
pub use status::JobStatus;

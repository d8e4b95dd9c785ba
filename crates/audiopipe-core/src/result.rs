//! Convenience result type alias for AudioPipe.

use crate::error::AppError;

/// A specialized `Result` type for AudioPipe operations.
pub type AppResult<T> = Result<T, AppError>;

//! # audiopipe-core
//!
//! Core crate for AudioPipe. Contains configuration schemas, the message
//! broker contract, typed identifiers, and the unified error system shared
//! by the intake, conversion and notification services.
//!
//! This crate has **no** internal dependencies on other AudioPipe crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;

//! Queue handler implementations.

pub mod conversion;
pub mod notification;

pub use conversion::ConversionHandler;
pub use notification::NotificationHandler;

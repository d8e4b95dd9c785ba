//! Notification delivery log entities.

pub mod log;

pub use log::{DeliveryStatus, NotificationLogEntry};

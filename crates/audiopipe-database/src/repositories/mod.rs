//! PostgreSQL repository implementations.

pub mod job;
pub mod notification_log;

pub use job::JobRepository;
pub use notification_log::NotificationLogRepository;

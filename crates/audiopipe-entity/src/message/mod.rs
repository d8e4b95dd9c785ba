//! Messages carried by the work and notification queues.

pub mod notification;
pub mod timestamp;
pub mod work;

pub use notification::NotificationMessage;
pub use work::WorkMessage;

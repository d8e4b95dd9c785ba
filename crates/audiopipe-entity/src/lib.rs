//! # audiopipe-entity
//!
//! Domain entities for AudioPipe: the conversion job record, the messages
//! exchanged over the work and notification queues, and the notification
//! delivery log.

pub mod job;
pub mod message;
pub mod notification;

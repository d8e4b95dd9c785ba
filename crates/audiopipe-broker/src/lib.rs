//! # audiopipe-broker
//!
//! Message broker providers for AudioPipe. Supports two modes:
//!
//! - **redis**: durable queues on Redis Streams consumer groups
//! - **memory**: in-process queues with the same claim/ack semantics
//!
//! The provider is selected at runtime based on configuration.

#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::BrokerManager;

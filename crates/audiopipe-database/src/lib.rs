//! # audiopipe-database
//!
//! Job record store for AudioPipe. Defines the [`JobStore`] and
//! [`NotificationLogStore`] contracts, their PostgreSQL implementations,
//! and in-process implementations for tests and single-process runs.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use store::{JobStore, NotificationLogStore, StatusUpdate, TransitionOutcome};

//! Queue consumers for AudioPipe.
//!
//! This crate provides:
//! - A [`MessageHandler`] trait with an explicit ack/redeliver error contract
//! - A [`WorkerRunner`] that pulls deliveries into a bounded slot pool
//! - Handlers for the conversion and notification queues

pub mod handler;
pub mod jobs;
pub mod runner;

pub use handler::{JobExecutionError, MessageHandler};
pub use runner::WorkerRunner;

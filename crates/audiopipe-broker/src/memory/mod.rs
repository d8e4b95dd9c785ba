//! In-process broker.

pub mod queue;

pub use queue::MemoryBroker;

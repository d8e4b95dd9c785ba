//! Core traits defined in `audiopipe-core` and implemented by other crates.

pub mod broker;

pub use broker::{Acknowledger, Delivery, DeliveryStream, MessageBroker};

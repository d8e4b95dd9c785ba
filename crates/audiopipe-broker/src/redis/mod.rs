//! Redis Streams broker provider.

pub mod client;
pub mod streams;

pub use client::RedisClient;
pub use streams::RedisStreamsBroker;

//! Trait abstractions for dependency injection and testability.
//!
//! # Traits
//!
//! - [`DuplexChannel`] - text-frame duplex transport (WebSocket or mock)

pub mod channel;

pub use channel::{DuplexChannel, ReadyState};

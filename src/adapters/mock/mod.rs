//! Mock implementations for testing.
//!
//! # Available Mocks
//!
//! - [`MockChannel`] - duplex channel that records outbound frames

pub mod channel;

pub use channel::MockChannel;

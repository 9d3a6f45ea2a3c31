//! Concrete implementations of trait abstractions.
//!
//! The production [`crate::traits::DuplexChannel`] is
//! [`crate::websocket::WsChannel`]; this module holds the test doubles.

pub mod mock;

pub use mock::MockChannel;

//! WebSocket transport for the agent backend.
//!
//! This module provides the duplex client (with automatic reconnection), the
//! outbound message types, and the stateless [`EventSender`] that writes
//! them to any [`crate::traits::DuplexChannel`].

pub mod client;
pub mod messages;
pub mod sender;

pub use client::{backoff_secs, WsChannel, WsClient, WsClientConfig, WsConnectionState, WsError};
pub use messages::{AudioAction, AudioFormat, OutgoingEnvelope, OutgoingEvent, PROTOCOL_VERSION};
pub use sender::EventSender;

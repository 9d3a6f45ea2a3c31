//! agentwire - streaming chat client with tool-approval negotiation
//!
//! The library exposes the protocol engine (frame codec, event receiver,
//! connection manager, auto-resend decision and confirmation router) and
//! both transports for use by the binary and integration tests.

pub mod adapters;
pub mod approval;
pub mod cli;
pub mod config;
pub mod error;
pub mod http_stream;
pub mod models;
pub mod session;
pub mod sse;
pub mod stream;
pub mod traits;
pub mod websocket;

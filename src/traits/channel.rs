//! Duplex channel trait abstraction.
//!
//! The connection manager, event sender and confirmation router never hold a
//! concrete socket. They talk to a [`DuplexChannel`], which lets tests swap
//! in [`crate::adapters::mock::MockChannel`] and lets a reconnect replace the
//! underlying socket without the callers noticing.

use crate::websocket::WsError;

/// Ready state of a duplex channel, mirroring the WebSocket states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    pub fn is_open(&self) -> bool {
        matches!(self, ReadyState::Open)
    }
}

/// Trait for a text-frame duplex channel.
///
/// Sends are synchronous hand-offs (typically onto an `mpsc` queue drained
/// by the socket task); they must not block.
pub trait DuplexChannel: Send + Sync {
    /// Current ready state.
    fn ready_state(&self) -> ReadyState;

    /// Queue one text frame for sending.
    fn send_text(&self, frame: String) -> Result<(), WsError>;
}

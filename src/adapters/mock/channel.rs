//! Mock duplex channel for testing.
//!
//! Captures every outbound frame and lets tests drive the ready state and
//! force send failures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::traits::{DuplexChannel, ReadyState};
use crate::websocket::WsError;

/// Mock duplex channel.
///
/// Clones share state, so a test can keep one handle while the code under
/// test owns another.
///
/// # Example
///
/// ```ignore
/// use agentwire::adapters::mock::MockChannel;
/// use agentwire::websocket::EventSender;
///
/// let channel = MockChannel::new();
/// EventSender::new().send_ping(&channel);
/// assert_eq!(channel.sent_json()[0]["type"], "ping");
/// ```
#[derive(Debug, Clone)]
pub struct MockChannel {
    state: Arc<Mutex<ReadyState>>,
    sent: Arc<Mutex<Vec<String>>>,
    send_should_fail: Arc<AtomicBool>,
}

impl MockChannel {
    /// Create a new mock channel in the open state.
    pub fn new() -> Self {
        Self::with_state(ReadyState::Open)
    }

    pub fn with_state(state: ReadyState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            sent: Arc::new(Mutex::new(Vec::new())),
            send_should_fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_state(&self, state: ReadyState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Raw frames sent so far, oldest first.
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Sent frames parsed as JSON. Frames that fail to parse are skipped.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent_frames()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Sent frames whose `type` field equals `event_type`.
    pub fn sent_of_type(&self, event_type: &str) -> Vec<Value> {
        self.sent_json()
            .into_iter()
            .filter(|v| v["type"] == event_type)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Configure whether send should fail.
    pub fn set_send_should_fail(&self, should_fail: bool) {
        self.send_should_fail.store(should_fail, Ordering::SeqCst);
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DuplexChannel for MockChannel {
    fn ready_state(&self) -> ReadyState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send_text(&self, frame: String) -> Result<(), WsError> {
        if self.send_should_fail.load(Ordering::SeqCst) {
            return Err(WsError::SendFailed("Mock send failure".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(frame);
        Ok(())
    }
}

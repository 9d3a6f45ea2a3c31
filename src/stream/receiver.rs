//! Approval-cycle state tracking for the inbound event stream.
//!
//! [`EventReceiver`] watches every decoded [`ProtocolEvent`] and maintains
//! two flags: whether an approval request is pending and whether the current
//! turn has closed. Events themselves are never altered or swallowed; the
//! receiver only reports transitions.

use tracing::debug;

use crate::sse::ProtocolEvent;

/// Snapshot of the receiver's flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverState {
    pub approval_pending: bool,
    pub turn_closed: bool,
}

/// Identifiers carried by a `tool-approval-request` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub tool_call_id: String,
    pub approval_id: String,
}

/// A state transition observed on one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverSignal {
    /// The backend asked for approval of a tool call.
    ApprovalRequested(ApprovalRequest),
    /// The turn closed while an approval was pending.
    ApprovalStreamClosed,
    /// The turn closed with no approval pending.
    TurnClosed,
}

pub type ApprovalRequestedCallback = Box<dyn FnMut(&ApprovalRequest) + Send>;
pub type ApprovalStreamClosedCallback = Box<dyn FnMut() + Send>;

/// Tracks approval and turn state across inbound events.
#[derive(Default)]
pub struct EventReceiver {
    state: ReceiverState,
    on_approval_requested: Option<ApprovalRequestedCallback>,
    on_approval_stream_closed: Option<ApprovalStreamClosedCallback>,
}

impl EventReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per `tool-approval-request` event.
    pub fn on_approval_requested<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&ApprovalRequest) + Send + 'static,
    {
        self.on_approval_requested = Some(Box::new(callback));
        self
    }

    /// Called once when a turn closes with an approval pending.
    pub fn on_approval_stream_closed<F>(mut self, callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.on_approval_stream_closed = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Clear both flags.
    pub fn reset(&mut self) {
        self.state = ReceiverState::default();
    }

    /// Update state for one event and report the transition, if any.
    pub fn observe(&mut self, event: &ProtocolEvent) -> Option<ReceiverSignal> {
        match event {
            ProtocolEvent::ToolApprovalRequest {
                approval_id,
                tool_call_id,
            } => {
                // A new approval reopens the cycle so a later finish-step
                // closes it again.
                self.state.approval_pending = true;
                self.state.turn_closed = false;
                let request = ApprovalRequest {
                    tool_call_id: tool_call_id.clone(),
                    approval_id: approval_id.clone(),
                };
                debug!(
                    tool_call_id = %request.tool_call_id,
                    approval_id = %request.approval_id,
                    "Approval requested"
                );
                if let Some(callback) = self.on_approval_requested.as_mut() {
                    callback(&request);
                }
                Some(ReceiverSignal::ApprovalRequested(request))
            }
            ProtocolEvent::FinishStep | ProtocolEvent::Done => self.close_turn(),
            _ => None,
        }
    }

    /// Only the first closing transition per turn takes effect.
    fn close_turn(&mut self) -> Option<ReceiverSignal> {
        if self.state.turn_closed {
            return None;
        }
        self.state.turn_closed = true;

        if self.state.approval_pending {
            debug!("Turn closed with approval pending");
            if let Some(callback) = self.on_approval_stream_closed.as_mut() {
                callback();
            }
            Some(ReceiverSignal::ApprovalStreamClosed)
        } else {
            debug!("Turn closed");
            Some(ReceiverSignal::TurnClosed)
        }
    }
}

impl std::fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReceiver")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn approval_request(id: &str) -> ProtocolEvent {
        ProtocolEvent::ToolApprovalRequest {
            approval_id: format!("approval-{}", id),
            tool_call_id: id.to_string(),
        }
    }

    fn counting_receiver() -> (EventReceiver, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let requested = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let r = requested.clone();
        let c = closed.clone();
        let receiver = EventReceiver::new()
            .on_approval_requested(move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            })
            .on_approval_stream_closed(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        (receiver, requested, closed)
    }

    #[test]
    fn test_approval_request_sets_pending() {
        let (mut receiver, requested, _) = counting_receiver();
        let signal = receiver.observe(&approval_request("call-1"));

        assert_eq!(
            signal,
            Some(ReceiverSignal::ApprovalRequested(ApprovalRequest {
                tool_call_id: "call-1".to_string(),
                approval_id: "approval-call-1".to_string(),
            }))
        );
        assert!(receiver.state().approval_pending);
        assert!(!receiver.state().turn_closed);
        assert_eq!(requested.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_fires_per_request_event() {
        let (mut receiver, requested, _) = counting_receiver();
        receiver.observe(&approval_request("a"));
        receiver.observe(&approval_request("b"));
        assert_eq!(requested.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_finish_step_while_pending_fires_closed_once() {
        let (mut receiver, _, closed) = counting_receiver();
        receiver.observe(&approval_request("call-1"));

        assert_eq!(
            receiver.observe(&ProtocolEvent::FinishStep),
            Some(ReceiverSignal::ApprovalStreamClosed)
        );
        assert!(receiver.state().turn_closed);

        // Sentinel after finish-step is a no-op
        assert_eq!(receiver.observe(&ProtocolEvent::Done), None);
        assert_eq!(receiver.observe(&ProtocolEvent::FinishStep), None);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_finish_step_without_pending() {
        let (mut receiver, _, closed) = counting_receiver();
        assert_eq!(
            receiver.observe(&ProtocolEvent::FinishStep),
            Some(ReceiverSignal::TurnClosed)
        );
        assert!(receiver.state().turn_closed);
        assert!(!receiver.state().approval_pending);
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sentinel_closes_pending_turn() {
        let (mut receiver, _, closed) = counting_receiver();
        receiver.observe(&approval_request("call-1"));
        assert_eq!(
            receiver.observe(&ProtocolEvent::Done),
            Some(ReceiverSignal::ApprovalStreamClosed)
        );
        assert_eq!(receiver.observe(&ProtocolEvent::Done), None);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_new_request_reopens_closed_turn() {
        let (mut receiver, _, closed) = counting_receiver();
        receiver.observe(&ProtocolEvent::FinishStep);
        receiver.observe(&approval_request("call-2"));
        assert!(!receiver.state().turn_closed);

        receiver.observe(&ProtocolEvent::FinishStep);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_other_events_do_not_change_state() {
        let mut receiver = EventReceiver::new();
        let events = [
            ProtocolEvent::Start { message_id: None },
            ProtocolEvent::TextDelta {
                id: "t".to_string(),
                delta: "hi".to_string(),
            },
            ProtocolEvent::Finish,
            ProtocolEvent::Passthrough(serde_json::json!({"type": "data-x"})),
        ];
        for event in &events {
            assert_eq!(receiver.observe(event), None);
        }
        assert_eq!(receiver.state(), ReceiverState::default());
    }

    #[test]
    fn test_reset_clears_both_flags() {
        let mut receiver = EventReceiver::new();
        receiver.observe(&approval_request("call-1"));
        receiver.observe(&ProtocolEvent::FinishStep);
        receiver.reset();
        assert_eq!(receiver.state(), ReceiverState::default());
    }
}

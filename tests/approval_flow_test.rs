//! End-to-end approval cycles through the connection manager, driven over a
//! mock duplex channel with a paused clock.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentwire::adapters::mock::MockChannel;
use agentwire::approval::{ChannelUsed, ConfirmationRouter, Transports};
use agentwire::error::StreamError;
use agentwire::models::{ApprovalDecision, Message, TurnRequest};
use agentwire::sse::ProtocolEvent;
use agentwire::stream::{
    ConnectionManager, EventReceiver, ManagerConfig, PumpOutcome, SequenceItem, TurnSequence,
};
use agentwire::traits::DuplexChannel;
use bytes::Bytes;
use common::{approval_request_frame, approval_turn, confirmation_invocation, finish_step_frame};
use tokio::sync::mpsc;

fn config(timeout_secs: u64, keepalive_secs: Option<u64>) -> ManagerConfig {
    ManagerConfig {
        response_timeout: Duration::from_secs(timeout_secs),
        keepalive_interval: keepalive_secs.map(Duration::from_secs),
    }
}

fn request() -> TurnRequest {
    TurnRequest::submit("chat-1", vec![Message::user_text("move 120 to savings")])
}

fn opened(sequence: TurnSequence) -> mpsc::UnboundedReceiver<SequenceItem> {
    match sequence {
        TurnSequence::Opened { events, .. } => events,
        TurnSequence::Reused { id } => panic!("expected a new sequence, reused {}", id),
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<SequenceItem>) -> Vec<SequenceItem> {
    let mut items = Vec::new();
    while let Ok(item) = events.try_recv() {
        items.push(item);
    }
    items
}

#[tokio::test(start_paused = true)]
async fn test_approval_turn_fires_callbacks_once() {
    let requested = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(Mutex::new(0u32));

    let receiver = {
        let requested = Arc::clone(&requested);
        let closed = Arc::clone(&closed);
        EventReceiver::new()
            .on_approval_requested(move |req| {
                requested.lock().unwrap().push(req.approval_id.clone());
            })
            .on_approval_stream_closed(move || {
                *closed.lock().unwrap() += 1;
            })
    };

    let channel = MockChannel::new();
    let mut manager =
        ConnectionManager::with_receiver(Arc::new(channel.clone()), config(5, None), receiver);
    let mut events = opened(manager.submit(&request()).unwrap());

    // finish-step and [DONE] both close the turn; only the first counts.
    assert_eq!(manager.ingest(approval_turn("call-1", "appr-1").as_bytes()), 6);

    assert_eq!(*requested.lock().unwrap(), vec!["appr-1".to_string()]);
    assert_eq!(*closed.lock().unwrap(), 1);
    assert!(manager.receiver_state().turn_closed);
    assert!(manager.receiver_state().approval_pending);
    assert!(!manager.deadline_armed());

    let items = drain(&mut events);
    assert_eq!(items.len(), 6);
    assert!(items.iter().all(Result::is_ok));
    assert_eq!(items.last(), Some(&Ok(ProtocolEvent::Done)));
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_approval_times_out() {
    let channel = MockChannel::new();
    let mut manager = ConnectionManager::new(Arc::new(channel.clone()), config(5, None));
    let (tx, mut incoming) = mpsc::channel::<Bytes>(8);
    let mut events = opened(manager.submit(&request()).unwrap());

    tx.send(Bytes::from(approval_request_frame("appr-1", "call-1")))
        .await
        .unwrap();
    assert_eq!(manager.pump(&mut incoming).await, PumpOutcome::Ingested(1));
    assert!(manager.deadline_armed());

    let outcome = manager.pump(&mut incoming).await;
    assert_eq!(
        outcome,
        PumpOutcome::TimedOut(StreamError::ApprovalTimeout { duration_secs: 5 })
    );
    assert!(!manager.deadline_armed());
    assert_eq!(manager.active_sequence(), None);

    let items = drain(&mut events);
    assert!(matches!(
        items[0],
        Ok(ProtocolEvent::ToolApprovalRequest { .. })
    ));
    assert_eq!(
        items[1],
        Err(StreamError::ApprovalTimeout { duration_secs: 5 })
    );
    assert_eq!(events.recv().await, None);

    // The failed cycle does not poison the next turn.
    assert!(manager.submit(&request()).unwrap().is_new());
}

#[tokio::test(start_paused = true)]
async fn test_chunk_before_deadline_is_ingested() {
    let channel = MockChannel::new();
    let mut manager = ConnectionManager::new(Arc::new(channel.clone()), config(5, None));
    let (tx, mut incoming) = mpsc::channel::<Bytes>(8);
    let _events = opened(manager.submit(&request()).unwrap());

    manager.ingest(approval_request_frame("appr-1", "call-1").as_bytes());
    tokio::time::advance(Duration::from_secs(4)).await;

    tx.send(Bytes::from(finish_step_frame())).await.unwrap();
    assert_eq!(manager.pump(&mut incoming).await, PumpOutcome::Ingested(1));
    assert!(!manager.deadline_armed());
    assert!(manager.receiver_state().turn_closed);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_ping_on_interval() {
    let channel = MockChannel::new();
    let mut manager = ConnectionManager::new(Arc::new(channel.clone()), config(60, Some(30)));
    let (_tx, mut incoming) = mpsc::channel::<Bytes>(8);

    let start = tokio::time::Instant::now();
    assert_eq!(
        manager.pump(&mut incoming).await,
        PumpOutcome::KeepaliveSent(true)
    );
    assert!(start.elapsed() >= Duration::from_secs(30));

    let pings = channel.sent_of_type("ping");
    assert_eq!(pings.len(), 1);
    assert_eq!(pings[0]["version"], "1.0");
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_on_closed_channel_reports_failure() {
    let channel = MockChannel::new();
    let mut manager = ConnectionManager::new(Arc::new(channel.clone()), config(60, Some(10)));
    let (_tx, mut incoming) = mpsc::channel::<Bytes>(8);

    channel.set_state(agentwire::traits::ReadyState::Closed);
    assert_eq!(
        manager.pump(&mut incoming).await,
        PumpOutcome::KeepaliveSent(false)
    );
    assert!(channel.sent_frames().is_empty());
}

#[tokio::test]
async fn test_disconnect_ends_sequence_with_connection_lost() {
    let channel = MockChannel::new();
    let mut manager = ConnectionManager::new(Arc::new(channel.clone()), config(5, None));
    let (tx, mut incoming) = mpsc::channel::<Bytes>(8);
    let mut events = opened(manager.submit(&request()).unwrap());

    // Trailing frame without a newline is flushed before the close.
    tx.send(Bytes::from_static(b"data: {\"type\":\"start\"}\n\ndata: {\"type\":\"finish\"}"))
        .await
        .unwrap();
    drop(tx);

    assert_eq!(manager.pump(&mut incoming).await, PumpOutcome::Ingested(1));
    assert_eq!(manager.pump(&mut incoming).await, PumpOutcome::Disconnected);

    let items = drain(&mut events);
    assert!(matches!(items[0], Ok(ProtocolEvent::Start { .. })));
    assert_eq!(items[1], Ok(ProtocolEvent::Finish));
    assert!(matches!(items[2], Err(StreamError::ConnectionLost { .. })));
}

#[tokio::test]
async fn test_resend_after_approval_reuses_open_sequence() {
    let channel = MockChannel::new();
    let mut manager = ConnectionManager::new(Arc::new(channel.clone()), config(5, None));
    let mut events = opened(manager.submit(&request()).unwrap());

    // Backend asked for approval but has not closed the step yet.
    manager.ingest(approval_request_frame("appr-1", "call-1").as_bytes());
    let second = manager.submit(&request()).unwrap();
    assert!(matches!(second, TurnSequence::Reused { id: 1 }));
    assert_eq!(channel.sent_of_type("message").len(), 2);

    manager.ingest(finish_step_frame().as_bytes());
    let items = drain(&mut events);
    assert_eq!(items.len(), 2);
    assert_eq!(items[1], Ok(ProtocolEvent::FinishStep));
}

#[tokio::test]
async fn test_confirmation_routed_over_managers_channel() {
    let channel = MockChannel::new();
    let manager = ConnectionManager::new(Arc::new(channel.clone()), config(5, None));
    let duplex: Arc<dyn DuplexChannel> = Arc::clone(manager.channel());

    let pending = confirmation_invocation("wrap-1", "orig-Y", "pay");
    let outcome = ConfirmationRouter::new().route(
        &pending,
        &ApprovalDecision::approve(),
        Transports::duplex(&duplex),
    );

    assert!(outcome.success);
    assert_eq!(outcome.channel_used, Some(ChannelUsed::Duplex));
    let results = channel.sent_of_type("tool_result");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["toolCallId"], "orig-Y");
    assert_eq!(results[0]["result"]["approved"], true);
}

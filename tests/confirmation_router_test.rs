//! Confirmation routing: which identifiers each transport addresses.

mod common;

use std::sync::{Arc, Mutex};

use agentwire::adapters::mock::MockChannel;
use agentwire::approval::{
    ChannelUsed, ConfirmationRouter, DuplexHandle, RouteError, StreamToolOutput, ToolAddress,
    ToolOutputSink, Transports,
};
use agentwire::models::ApprovalDecision;
use agentwire::traits::DuplexChannel;
use common::{confirmation_invocation, invocation};
use serde_json::json;

fn recording_sink() -> (Arc<ToolOutputSink>, Arc<Mutex<Vec<StreamToolOutput>>>) {
    let outputs = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&outputs);
    let sink: Arc<ToolOutputSink> = Arc::new(move |output: StreamToolOutput| -> Result<(), String> {
        captured.lock().unwrap().push(output);
        Ok(())
    });
    (sink, outputs)
}

#[test]
fn test_duplex_addresses_original_call() {
    let mock = MockChannel::new();
    let channel: Arc<dyn DuplexChannel> = Arc::new(mock.clone());
    let pending = confirmation_invocation("wrap-X", "orig-Y", "pay");

    let outcome = ConfirmationRouter::new().route(
        &pending,
        &ApprovalDecision::approve(),
        Transports::duplex(&channel),
    );

    assert!(outcome.success);
    assert_eq!(outcome.channel_used, Some(ChannelUsed::Duplex));
    assert_eq!(
        outcome.addressed,
        Some(ToolAddress {
            tool_call_id: "orig-Y".to_string(),
            tool_name: "pay".to_string(),
        })
    );

    let sent = mock.sent_of_type("tool_result");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["toolCallId"], "orig-Y");
    assert_eq!(sent[0]["toolName"], "pay");
    assert_eq!(
        sent[0]["result"],
        json!({"approved": true, "user_message": "User approved the tool execution"})
    );
    assert!(mock.sent_frames()[0].find("wrap-X").is_none());
}

#[test]
fn test_stream_addresses_wrapper_with_confirmed_flag() {
    let (sink, outputs) = recording_sink();
    let pending = confirmation_invocation("wrap-X", "orig-Y", "pay");

    let outcome = ConfirmationRouter::new().route(
        &pending,
        &ApprovalDecision::deny(None),
        Transports::stream(&sink),
    );

    assert!(outcome.success);
    assert_eq!(outcome.channel_used, Some(ChannelUsed::EventStream));
    let outputs = outputs.lock().unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].tool_call_id, "wrap-X");
    assert_eq!(outputs[0].tool_name, "adk_request_confirmation");
    assert_eq!(outputs[0].output, json!({"confirmed": false}));
}

#[test]
fn test_duplex_preferred_when_both_available() {
    let mock = MockChannel::new();
    let channel: Arc<dyn DuplexChannel> = Arc::new(mock.clone());
    let (sink, outputs) = recording_sink();
    let transports = Transports {
        duplex: Some(DuplexHandle::new(&channel)),
        ..Transports::stream(&sink)
    };

    let outcome = ConfirmationRouter::new().route(
        &confirmation_invocation("wrap-1", "orig-1", "pay"),
        &ApprovalDecision::approve(),
        transports,
    );

    assert_eq!(outcome.channel_used, Some(ChannelUsed::Duplex));
    assert_eq!(mock.sent_of_type("tool_result").len(), 1);
    assert!(outputs.lock().unwrap().is_empty());
}

#[test]
fn test_non_confirmation_tool_sends_nothing() {
    let mock = MockChannel::new();
    let channel: Arc<dyn DuplexChannel> = Arc::new(mock.clone());
    let pending = invocation("c1", agentwire::models::ToolState::ApprovalRequested);

    let outcome = ConfirmationRouter::new().route(
        &pending,
        &ApprovalDecision::approve(),
        Transports::duplex(&channel),
    );

    assert!(!outcome.success);
    assert_eq!(outcome.channel_used, None);
    assert_eq!(
        outcome.error,
        Some(RouteError::InvalidToolName {
            tool_name: "transfer_money".to_string()
        })
    );
    assert!(mock.sent_frames().is_empty());
}

#[test]
fn test_no_transport() {
    let outcome = ConfirmationRouter::new().route(
        &confirmation_invocation("wrap-1", "orig-1", "pay"),
        &ApprovalDecision::approve(),
        Transports::default(),
    );
    assert_eq!(outcome.into_result(), Err(RouteError::NoTransport));
}

#[test]
fn test_dropped_channel_is_binding_lost_without_fallback() {
    let mock = MockChannel::new();
    let channel: Arc<dyn DuplexChannel> = Arc::new(mock.clone());
    let (sink, outputs) = recording_sink();
    let transports = Transports {
        duplex: Some(DuplexHandle::new(&channel)),
        ..Transports::stream(&sink)
    };
    drop(channel);

    let outcome = ConfirmationRouter::new().route(
        &confirmation_invocation("wrap-1", "orig-1", "pay"),
        &ApprovalDecision::approve(),
        transports,
    );

    assert_eq!(outcome.error, Some(RouteError::BindingLost));
    assert_eq!(outcome.channel_used, Some(ChannelUsed::Duplex));
    assert!(mock.sent_frames().is_empty());
    assert!(outputs.lock().unwrap().is_empty());
}

#[test]
fn test_missing_original_call_over_duplex() {
    let mock = MockChannel::new();
    let channel: Arc<dyn DuplexChannel> = Arc::new(mock.clone());
    let mut pending = confirmation_invocation("wrap-1", "orig-1", "pay");
    pending.input = json!({"toolConfirmation": {"hint": "Approve?"}});

    let outcome = ConfirmationRouter::new().route(
        &pending,
        &ApprovalDecision::approve(),
        Transports::duplex(&channel),
    );

    assert_eq!(outcome.error, Some(RouteError::MissingOriginalFunctionCall));
    assert!(!outcome.error.as_ref().is_some_and(RouteError::is_retryable));
    assert!(mock.sent_frames().is_empty());
}

#[test]
fn test_send_failure_is_retryable() {
    let mock = MockChannel::new();
    mock.set_send_should_fail(true);
    let channel: Arc<dyn DuplexChannel> = Arc::new(mock.clone());

    let outcome = ConfirmationRouter::new().route(
        &confirmation_invocation("wrap-1", "orig-1", "pay"),
        &ApprovalDecision::approve(),
        Transports::duplex(&channel),
    );

    assert_eq!(outcome.error, Some(RouteError::SendFailed));
    assert!(outcome.error.as_ref().is_some_and(RouteError::is_retryable));
}

//! Common test utilities for integration tests.
//!
//! Frame builders produce the exact wire text the backend emits, and the
//! message builders produce assistant messages with tool invocations in a
//! given lifecycle state.

#![allow(dead_code)]

use agentwire::models::{Approval, Message, Part, Role, ToolInvocation, ToolState};
use serde_json::{json, Value};

/// One `data:` frame followed by the blank separator line.
pub fn frame(payload: &Value) -> String {
    format!("data: {}\n\n", payload)
}

pub fn done_frame() -> String {
    "data: [DONE]\n\n".to_string()
}

pub fn approval_request_frame(approval_id: &str, tool_call_id: &str) -> String {
    frame(&json!({
        "type": "tool-approval-request",
        "approvalId": approval_id,
        "toolCallId": tool_call_id,
    }))
}

pub fn finish_step_frame() -> String {
    frame(&json!({"type": "finish-step"}))
}

pub fn text_delta_frame(delta: &str) -> String {
    frame(&json!({"type": "text-delta", "id": "txt-1", "delta": delta}))
}

/// A typical approval turn: start, tool input, approval request, step end.
pub fn approval_turn(tool_call_id: &str, approval_id: &str) -> String {
    [
        frame(&json!({"type": "start", "messageId": "msg-1"})),
        frame(&json!({"type": "start-step"})),
        frame(&json!({
            "type": "tool-input-available",
            "toolCallId": tool_call_id,
            "toolName": "transfer_money",
            "input": {"amount": 120, "to": "savings"},
        })),
        approval_request_frame(approval_id, tool_call_id),
        finish_step_frame(),
        done_frame(),
    ]
    .concat()
}

/// A tool invocation already moved into `state`, with the fields that
/// state requires.
pub fn invocation(tool_call_id: &str, state: ToolState) -> ToolInvocation {
    let mut inv = ToolInvocation::new(tool_call_id, "transfer_money");
    inv.input = json!({"amount": 120});
    inv.state = state;
    match state {
        ToolState::ApprovalRequested => {
            inv.approval = Some(Approval::pending(format!("appr-{}", tool_call_id)));
        }
        ToolState::ApprovalResponded | ToolState::OutputDenied => {
            inv.approval = Some(Approval {
                id: format!("appr-{}", tool_call_id),
                approved: Some(state == ToolState::ApprovalResponded),
                reason: None,
            });
        }
        ToolState::OutputAvailable => {
            inv.output = Some(json!({"status": "ok"}));
        }
        ToolState::OutputError => {
            inv.error_text = Some("insufficient funds".to_string());
        }
        ToolState::InputStreaming | ToolState::InputAvailable => {}
    }
    inv
}

pub fn assistant_with(message_id: &str, invocations: Vec<ToolInvocation>) -> Message {
    let mut message = Message::new(message_id, Role::Assistant);
    for inv in invocations {
        message.parts.push(Part::ToolInvocation(inv));
    }
    message
}

/// A confirmation-tool invocation wrapping `original_id`/`original_name`.
pub fn confirmation_invocation(
    wrapper_id: &str,
    original_id: &str,
    original_name: &str,
) -> ToolInvocation {
    let mut inv = ToolInvocation::new(wrapper_id, agentwire::approval::CONFIRMATION_TOOL_NAME);
    inv.input = json!({
        "originalFunctionCall": {
            "id": original_id,
            "name": original_name,
            "args": {"amount": 50},
        },
        "toolConfirmation": {"hint": "Approve payment?"},
    });
    inv.state = ToolState::ApprovalRequested;
    inv.approval = Some(Approval::pending("appr-1"));
    inv
}

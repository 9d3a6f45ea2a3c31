//! Message history assembled from protocol events.
//!
//! [`Conversation`] is the application-side history the engine reads. Each
//! applied event mutates the trailing assistant message and bumps a
//! revision counter, so callers can tell whether anything changed before
//! re-running the resend decision.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{
    Approval, ApprovalDecision, Message, Part, Role, TextPart, ToolInvocation, ToolState,
    TurnRequest,
};
use crate::sse::ProtocolEvent;

/// Errors from local edits to the history.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationError {
    /// No tool invocation with this id in the last assistant message
    UnknownToolCall { tool_call_id: String },
    /// The part is not waiting for an approval
    NotAwaitingApproval {
        tool_call_id: String,
        state: ToolState,
    },
}

impl std::fmt::Display for ConversationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationError::UnknownToolCall { tool_call_id } => {
                write!(f, "Unknown tool call: {}", tool_call_id)
            }
            ConversationError::NotAwaitingApproval {
                tool_call_id,
                state,
            } => write!(
                f,
                "Tool call {} is {} and not awaiting approval",
                tool_call_id, state
            ),
        }
    }
}

impl std::error::Error for ConversationError {}

/// One conversation's history.
#[derive(Debug, Clone)]
pub struct Conversation {
    chat_id: String,
    messages: Vec<Message>,
    revision: u64,
    /// Raw input text streamed so far, per tool call
    input_buffers: HashMap<String, String>,
}

impl Conversation {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            messages: Vec::new(),
            revision: 0,
            input_buffers: HashMap::new(),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Incremented on every change to the history.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Append a user text message.
    pub fn push_user_text(&mut self, text: impl Into<String>) -> &Message {
        self.messages.push(Message::user_text(text));
        self.bump();
        &self.messages[self.messages.len() - 1]
    }

    /// The full history as a turn submission.
    pub fn turn_request(&self) -> TurnRequest {
        TurnRequest::submit(self.chat_id.clone(), self.messages.clone())
    }

    /// Tool calls in the last message still waiting for a decision.
    pub fn pending_approvals(&self) -> Vec<&ToolInvocation> {
        self.assistant_tail()
            .map(|message| {
                message
                    .tool_invocations()
                    .filter(|inv| inv.state == ToolState::ApprovalRequested)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Apply one inbound event. Returns whether the history changed.
    pub fn apply(&mut self, event: &ProtocolEvent) -> bool {
        let changed = match event {
            ProtocolEvent::Start { message_id } => {
                let id = message_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                if self.assistant_tail().is_some_and(|m| m.id == id) {
                    false
                } else {
                    self.messages.push(Message::new(id, Role::Assistant));
                    true
                }
            }
            ProtocolEvent::TextStart { .. } => {
                self.open_assistant()
                    .parts
                    .push(Part::Text(TextPart::default()));
                true
            }
            ProtocolEvent::TextDelta { delta, .. } => {
                let message = self.open_assistant();
                if !matches!(message.parts.last(), Some(Part::Text(_))) {
                    message.parts.push(Part::Text(TextPart::default()));
                }
                if let Some(Part::Text(text)) = message.parts.last_mut() {
                    text.text.push_str(delta);
                }
                true
            }
            ProtocolEvent::ToolInputStart {
                tool_call_id,
                tool_name,
            } => {
                let message = self.open_assistant();
                if message.tool_invocation(tool_call_id).is_some() {
                    warn!(tool_call_id = %tool_call_id, "Duplicate tool-input-start ignored");
                    false
                } else {
                    message.parts.push(Part::ToolInvocation(ToolInvocation::new(
                        tool_call_id.clone(),
                        tool_name.clone(),
                    )));
                    true
                }
            }
            ProtocolEvent::ToolInputDelta {
                tool_call_id,
                input_text_delta,
            } => {
                let buffer = self.input_buffers.entry(tool_call_id.clone()).or_default();
                buffer.push_str(input_text_delta);
                // Partial JSON is only shown once it parses
                match serde_json::from_str::<Value>(buffer) {
                    Ok(input) => self.update_tool(tool_call_id, |inv| inv.input = input),
                    Err(_) => false,
                }
            }
            ProtocolEvent::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
            } => {
                self.input_buffers.remove(tool_call_id);
                let message = self.open_assistant();
                if message.tool_invocation(tool_call_id).is_none() {
                    message.parts.push(Part::ToolInvocation(ToolInvocation::new(
                        tool_call_id.clone(),
                        tool_name.clone(),
                    )));
                }
                self.update_tool(tool_call_id, |inv| {
                    inv.input = input.clone();
                    inv.state = ToolState::InputAvailable;
                })
            }
            ProtocolEvent::ToolApprovalRequest {
                approval_id,
                tool_call_id,
            } => self.update_tool(tool_call_id, |inv| {
                inv.state = ToolState::ApprovalRequested;
                inv.approval = Some(Approval::pending(approval_id.clone()));
            }),
            ProtocolEvent::ToolOutputAvailable {
                tool_call_id,
                output,
            } => self.update_tool(tool_call_id, |inv| {
                inv.state = ToolState::OutputAvailable;
                inv.output = Some(output.clone());
            }),
            ProtocolEvent::ToolOutputError {
                tool_call_id,
                error_text,
            } => self.update_tool(tool_call_id, |inv| {
                inv.state = ToolState::OutputError;
                inv.output = None;
                inv.error_text = Some(error_text.clone());
            }),
            _ => false,
        };

        if changed {
            self.bump();
        }
        changed
    }

    /// Record the user's answer on a part awaiting approval.
    pub fn respond_to_approval(
        &mut self,
        tool_call_id: &str,
        decision: &ApprovalDecision,
    ) -> Result<(), ConversationError> {
        let invocation = self.tool_mut(tool_call_id)?;
        if invocation.state != ToolState::ApprovalRequested {
            return Err(ConversationError::NotAwaitingApproval {
                tool_call_id: tool_call_id.to_string(),
                state: invocation.state,
            });
        }

        let approval_id = invocation
            .approval
            .as_ref()
            .map(|a| a.id.clone())
            .unwrap_or_default();
        invocation.state = ToolState::ApprovalResponded;
        invocation.approval = Some(Approval {
            id: approval_id,
            approved: Some(decision.approved),
            reason: decision.reason.clone(),
        });
        debug!(tool_call_id, approved = decision.approved, "Approval recorded");
        self.bump();
        Ok(())
    }

    /// Attach a locally produced output to a tool call.
    pub fn add_tool_output(
        &mut self,
        tool_call_id: &str,
        output: Value,
    ) -> Result<(), ConversationError> {
        let invocation = self.tool_mut(tool_call_id)?;
        invocation.state = ToolState::OutputAvailable;
        invocation.output = Some(output);
        invocation.error_text = None;
        self.bump();
        Ok(())
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    fn assistant_tail(&self) -> Option<&Message> {
        self.messages
            .last()
            .filter(|message| message.role == Role::Assistant)
    }

    /// The trailing assistant message, created if the history ends elsewhere.
    fn open_assistant(&mut self) -> &mut Message {
        let needs_new = self
            .messages
            .last()
            .map_or(true, |message| message.role != Role::Assistant);
        if needs_new {
            self.messages.push(Message::new(
                uuid::Uuid::new_v4().to_string(),
                Role::Assistant,
            ));
        }
        let last = self.messages.len() - 1;
        &mut self.messages[last]
    }

    fn tool_mut(&mut self, tool_call_id: &str) -> Result<&mut ToolInvocation, ConversationError> {
        self.messages
            .last_mut()
            .filter(|message| message.role == Role::Assistant)
            .and_then(|message| message.tool_invocation_mut(tool_call_id))
            .ok_or_else(|| ConversationError::UnknownToolCall {
                tool_call_id: tool_call_id.to_string(),
            })
    }

    fn update_tool(
        &mut self,
        tool_call_id: &str,
        update: impl FnOnce(&mut ToolInvocation),
    ) -> bool {
        match self.tool_mut(tool_call_id) {
            Ok(invocation) => {
                update(invocation);
                true
            }
            Err(_) => {
                warn!(tool_call_id, "Event for unknown tool call ignored");
                false
            }
        }
    }
}

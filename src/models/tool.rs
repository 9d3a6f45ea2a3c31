//! Tool invocation parts and their approval lifecycle.
//!
//! Tool invocations are validated as they cross the serde boundary: an
//! unknown `state` string is rejected, and the `approval` / `output` fields
//! must agree with the state the part claims to be in.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a tool invocation part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    InputStreaming,
    InputAvailable,
    ApprovalRequested,
    ApprovalResponded,
    OutputAvailable,
    OutputError,
    OutputDenied,
}

impl ToolState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolState::InputStreaming => "input-streaming",
            ToolState::InputAvailable => "input-available",
            ToolState::ApprovalRequested => "approval-requested",
            ToolState::ApprovalResponded => "approval-responded",
            ToolState::OutputAvailable => "output-available",
            ToolState::OutputError => "output-error",
            ToolState::OutputDenied => "output-denied",
        }
    }

    /// Whether a part in this state may carry an approval record.
    pub fn allows_approval(&self) -> bool {
        !matches!(self, ToolState::InputStreaming | ToolState::InputAvailable)
    }
}

impl std::fmt::Display for ToolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval record attached to a tool invocation.
///
/// `approved` stays `None` while the request is pending and becomes the
/// explicit decision once the user has answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Approval {
    /// A pending approval request.
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            approved: None,
            reason: None,
        }
    }
}

/// A human's answer to an approval request. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    pub fn deny(reason: Option<String>) -> Self {
        Self {
            approved: false,
            reason,
        }
    }
}

/// Errors raised when a part violates the tool invocation invariants.
#[derive(Debug, Clone, PartialEq)]
pub enum PartError {
    /// The part has no `toolCallId`
    EmptyToolCallId,
    /// An approval record on a part that has not reached approval yet
    UnexpectedApproval { tool_call_id: String, state: ToolState },
    /// Output on a part that is not `output-available`
    UnexpectedOutput { tool_call_id: String, state: ToolState },
    /// `approval-requested` / `approval-responded` without an approval record
    MissingApproval { tool_call_id: String, state: ToolState },
    /// `approval-responded` whose approval carries no decision
    MissingDecision { tool_call_id: String },
    /// A required field of a known part type is absent
    MissingField { part: &'static str, field: &'static str },
    /// The tool invocation body could not be decoded
    InvalidToolInvocation(String),
}

impl std::fmt::Display for PartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartError::EmptyToolCallId => write!(f, "tool invocation has an empty toolCallId"),
            PartError::UnexpectedApproval {
                tool_call_id,
                state,
            } => write!(
                f,
                "tool invocation {} carries an approval in state {}",
                tool_call_id, state
            ),
            PartError::UnexpectedOutput {
                tool_call_id,
                state,
            } => write!(
                f,
                "tool invocation {} carries output in state {}",
                tool_call_id, state
            ),
            PartError::MissingApproval {
                tool_call_id,
                state,
            } => write!(
                f,
                "tool invocation {} is {} but has no approval",
                tool_call_id, state
            ),
            PartError::MissingDecision { tool_call_id } => write!(
                f,
                "tool invocation {} is approval-responded without a decision",
                tool_call_id
            ),
            PartError::MissingField { part, field } => {
                write!(f, "{} part is missing field '{}'", part, field)
            }
            PartError::InvalidToolInvocation(msg) => {
                write!(f, "invalid tool invocation: {}", msg)
            }
        }
    }
}

impl std::error::Error for PartError {}

/// A request, embedded in an assistant message, for an external capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawToolInvocation")]
pub struct ToolInvocation {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
    pub state: ToolState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval: Option<Approval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

/// Unvalidated wire shape of a tool invocation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToolInvocation {
    tool_call_id: String,
    #[serde(default)]
    tool_name: String,
    #[serde(default)]
    input: Value,
    state: ToolState,
    #[serde(default)]
    approval: Option<Approval>,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default, alias = "error")]
    error_text: Option<String>,
}

impl TryFrom<RawToolInvocation> for ToolInvocation {
    type Error = PartError;

    fn try_from(raw: RawToolInvocation) -> Result<Self, Self::Error> {
        let invocation = ToolInvocation {
            tool_call_id: raw.tool_call_id,
            tool_name: raw.tool_name,
            input: raw.input,
            state: raw.state,
            approval: raw.approval,
            output: raw.output,
            error_text: raw.error_text,
        };
        invocation.validate()?;
        Ok(invocation)
    }
}

impl ToolInvocation {
    /// Create a part that has just started streaming its input.
    pub fn new(tool_call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input: Value::Null,
            state: ToolState::InputStreaming,
            approval: None,
            output: None,
            error_text: None,
        }
    }

    /// Check the state/field invariants of this part.
    pub fn validate(&self) -> Result<(), PartError> {
        if self.tool_call_id.is_empty() {
            return Err(PartError::EmptyToolCallId);
        }
        if self.approval.is_some() && !self.state.allows_approval() {
            return Err(PartError::UnexpectedApproval {
                tool_call_id: self.tool_call_id.clone(),
                state: self.state,
            });
        }
        if self.output.is_some() && self.state != ToolState::OutputAvailable {
            return Err(PartError::UnexpectedOutput {
                tool_call_id: self.tool_call_id.clone(),
                state: self.state,
            });
        }
        match self.state {
            ToolState::ApprovalRequested if self.approval.is_none() => {
                Err(PartError::MissingApproval {
                    tool_call_id: self.tool_call_id.clone(),
                    state: self.state,
                })
            }
            ToolState::ApprovalResponded => match &self.approval {
                None => Err(PartError::MissingApproval {
                    tool_call_id: self.tool_call_id.clone(),
                    state: self.state,
                }),
                Some(approval) if approval.approved.is_none() => {
                    Err(PartError::MissingDecision {
                        tool_call_id: self.tool_call_id.clone(),
                    })
                }
                Some(_) => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// True if the part failed, either by state or by a non-empty error text.
    pub fn has_error(&self) -> bool {
        self.state == ToolState::OutputError
            || self.error_text.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// True if the part carries a usable output value.
    pub fn has_output(&self) -> bool {
        self.state == ToolState::OutputAvailable && self.output.as_ref().is_some_and(is_non_empty)
    }
}

/// `null`, `""`, `[]` and `{}` count as empty.
pub(crate) fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

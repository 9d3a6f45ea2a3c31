//! Protocol event types decoded from inbound frames.

use serde::Deserialize;
use serde_json::Value;

/// Represents a classified inbound line
#[derive(Debug, Clone, PartialEq)]
pub enum FrameLine {
    /// Data payload (e.g., `data: {"type":"text-delta",...}`)
    Data(String),
    /// Terminal sentinel (`data: [DONE]` or a bare `[DONE]`)
    Done,
    /// Empty line - frame separator
    Empty,
    /// Comment line (starts with ':') or anything unrecognised
    Comment(String),
}

/// Typed events of the streaming chat protocol.
///
/// Types this client does not interpret arrive as [`ProtocolEvent::Passthrough`]
/// with the raw JSON payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ProtocolEvent {
    /// Start of an assistant message
    Start {
        #[serde(default)]
        message_id: Option<String>,
    },
    StartStep,
    TextStart {
        #[serde(default)]
        id: String,
    },
    /// Streaming text chunk
    TextDelta {
        #[serde(default)]
        id: String,
        delta: String,
    },
    TextEnd {
        #[serde(default)]
        id: String,
    },
    ToolInputStart {
        tool_call_id: String,
        tool_name: String,
    },
    ToolInputDelta {
        tool_call_id: String,
        input_text_delta: String,
    },
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        input: Value,
    },
    /// The backend paused the turn until a human approves this call
    ToolApprovalRequest {
        approval_id: String,
        tool_call_id: String,
    },
    ToolOutputAvailable {
        tool_call_id: String,
        output: Value,
    },
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    /// End of one model step; closes the turn for approval purposes
    FinishStep,
    Finish,
    /// Error reported by the backend
    Error { error_text: String },
    /// Any frame type this client does not interpret
    #[serde(skip)]
    Passthrough(Value),
    /// Terminal sentinel
    #[serde(skip)]
    Done,
}

/// Frame types decoded into a typed [`ProtocolEvent`] variant.
pub const KNOWN_EVENT_TYPES: &[&str] = &[
    "start",
    "start-step",
    "text-start",
    "text-delta",
    "text-end",
    "tool-input-start",
    "tool-input-delta",
    "tool-input-available",
    "tool-approval-request",
    "tool-output-available",
    "tool-output-error",
    "finish-step",
    "finish",
    "error",
];

impl ProtocolEvent {
    /// Returns the event type name as a string for debugging purposes.
    pub fn event_type_name(&self) -> &str {
        match self {
            ProtocolEvent::Start { .. } => "start",
            ProtocolEvent::StartStep => "start-step",
            ProtocolEvent::TextStart { .. } => "text-start",
            ProtocolEvent::TextDelta { .. } => "text-delta",
            ProtocolEvent::TextEnd { .. } => "text-end",
            ProtocolEvent::ToolInputStart { .. } => "tool-input-start",
            ProtocolEvent::ToolInputDelta { .. } => "tool-input-delta",
            ProtocolEvent::ToolInputAvailable { .. } => "tool-input-available",
            ProtocolEvent::ToolApprovalRequest { .. } => "tool-approval-request",
            ProtocolEvent::ToolOutputAvailable { .. } => "tool-output-available",
            ProtocolEvent::ToolOutputError { .. } => "tool-output-error",
            ProtocolEvent::FinishStep => "finish-step",
            ProtocolEvent::Finish => "finish",
            ProtocolEvent::Error { .. } => "error",
            ProtocolEvent::Passthrough(value) => value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("passthrough"),
            ProtocolEvent::Done => "[DONE]",
        }
    }

    /// True for the terminal sentinel.
    pub fn is_done(&self) -> bool {
        matches!(self, ProtocolEvent::Done)
    }
}

/// Errors that can occur while decoding a single frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    /// Line was not valid UTF-8
    InvalidUtf8(String),
    /// Payload was not valid JSON
    InvalidJson { source: String },
    /// Payload JSON had no string `type` field
    MissingType,
    /// Payload had a known type but the wrong shape
    InvalidPayload { event_type: String, source: String },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::InvalidUtf8(msg) => write!(f, "Invalid UTF-8 in frame: {}", msg),
            FrameError::InvalidJson { source } => write!(f, "Invalid JSON in frame: {}", source),
            FrameError::MissingType => write!(f, "Frame payload has no 'type' field"),
            FrameError::InvalidPayload { event_type, source } => {
                write!(f, "Invalid payload for event '{}': {}", event_type, source)
            }
        }
    }
}

impl std::error::Error for FrameError {}

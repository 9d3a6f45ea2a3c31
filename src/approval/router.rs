//! Routes a human approval decision for a confirmation tool to the backend.
//!
//! Confirmation tools wrap another function call. Over the duplex channel
//! the backend expects the answer addressed to that ORIGINAL call; over the
//! HTTP event stream it expects it addressed to the wrapper itself. Getting
//! the identifiers wrong leaves the backend waiting forever.

use std::sync::{Arc, Weak};

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::models::{ApprovalDecision, ToolInvocation};
use crate::traits::DuplexChannel;
use crate::websocket::EventSender;

/// Tool name the backend uses for confirmation requests.
pub const CONFIRMATION_TOOL_NAME: &str = "adk_request_confirmation";

const APPROVED_MESSAGE: &str = "User approved the tool execution";
const DENIED_MESSAGE: &str = "User denied the tool execution";

/// Transport a decision was delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelUsed {
    Duplex,
    EventStream,
}

/// The call an answer was addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolAddress {
    pub tool_call_id: String,
    pub tool_name: String,
}

/// Routing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// The pending part is not a confirmation tool
    InvalidToolName { tool_name: String },
    /// Duplex routing needs `input.originalFunctionCall.{id,name}`
    MissingOriginalFunctionCall,
    /// Neither transport was supplied
    NoTransport,
    /// The transport's owner has been dropped
    BindingLost,
    /// The duplex channel exists but is not open
    ChannelNotOpen,
    /// The duplex channel refused the frame
    SendFailed,
    /// The event-stream callback returned an error
    OutputRejected(String),
}

impl RouteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RouteError::ChannelNotOpen | RouteError::SendFailed)
    }
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteError::InvalidToolName { tool_name } => {
                write!(f, "invalid tool name: {}", tool_name)
            }
            RouteError::MissingOriginalFunctionCall => write!(f, "missing original function call"),
            RouteError::NoTransport => write!(f, "no transport"),
            RouteError::BindingLost => write!(f, "binding lost"),
            RouteError::ChannelNotOpen => write!(f, "duplex channel not open"),
            RouteError::SendFailed => write!(f, "failed to send tool result"),
            RouteError::OutputRejected(msg) => write!(f, "tool output rejected: {}", msg),
        }
    }
}

impl std::error::Error for RouteError {}

/// Result of one routing attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteOutcome {
    pub success: bool,
    pub channel_used: Option<ChannelUsed>,
    pub error: Option<RouteError>,
    /// Identifiers the answer went to, when something was sent
    pub addressed: Option<ToolAddress>,
}

impl RouteOutcome {
    fn sent(channel: ChannelUsed, addressed: ToolAddress) -> Self {
        Self {
            success: true,
            channel_used: Some(channel),
            error: None,
            addressed: Some(addressed),
        }
    }

    fn failed(channel: Option<ChannelUsed>, error: RouteError) -> Self {
        Self {
            success: false,
            channel_used: channel,
            error: Some(error),
            addressed: None,
        }
    }

    pub fn into_result(self) -> Result<Option<ChannelUsed>, RouteError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.channel_used),
        }
    }
}

/// Weak reference to a duplex channel.
#[derive(Clone)]
pub struct DuplexHandle {
    channel: Weak<dyn DuplexChannel>,
}

impl DuplexHandle {
    pub fn new(channel: &Arc<dyn DuplexChannel>) -> Self {
        Self {
            channel: Arc::downgrade(channel),
        }
    }

    fn upgrade(&self) -> Option<Arc<dyn DuplexChannel>> {
        self.channel.upgrade()
    }
}

impl std::fmt::Debug for DuplexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexHandle")
            .field("alive", &(self.channel.strong_count() > 0))
            .finish()
    }
}

/// Tool output handed to the event-stream transport.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamToolOutput {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: Value,
}

/// Callback that attaches a tool output to the event-stream conversation.
pub type ToolOutputSink = dyn Fn(StreamToolOutput) -> Result<(), String> + Send + Sync;

/// Weak reference to a [`ToolOutputSink`].
#[derive(Clone)]
pub struct StreamHandle {
    sink: Weak<ToolOutputSink>,
}

impl StreamHandle {
    pub fn new(sink: &Arc<ToolOutputSink>) -> Self {
        Self {
            sink: Arc::downgrade(sink),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("alive", &(self.sink.strong_count() > 0))
            .finish()
    }
}

/// Transports available for one routing call. Duplex wins when both are set.
#[derive(Debug, Clone, Default)]
pub struct Transports {
    pub duplex: Option<DuplexHandle>,
    pub stream: Option<StreamHandle>,
}

impl Transports {
    pub fn duplex(channel: &Arc<dyn DuplexChannel>) -> Self {
        Self {
            duplex: Some(DuplexHandle::new(channel)),
            stream: None,
        }
    }

    pub fn stream(sink: &Arc<ToolOutputSink>) -> Self {
        Self {
            duplex: None,
            stream: Some(StreamHandle::new(sink)),
        }
    }
}

/// The call a confirmation tool wraps, read from its input.
fn original_function_call(pending: &ToolInvocation) -> Option<ToolAddress> {
    let call = pending
        .input
        .get("originalFunctionCall")
        .or_else(|| pending.input.get("original_function_call"))?;
    let id = call.get("id").and_then(Value::as_str)?;
    let name = call.get("name").and_then(Value::as_str)?;
    if id.is_empty() {
        return None;
    }
    Some(ToolAddress {
        tool_call_id: id.to_string(),
        tool_name: name.to_string(),
    })
}

/// Sends approval decisions for confirmation tools.
#[derive(Debug, Clone, Default)]
pub struct ConfirmationRouter {
    sender: EventSender,
}

impl ConfirmationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        &self,
        pending: &ToolInvocation,
        decision: &ApprovalDecision,
        transports: Transports,
    ) -> RouteOutcome {
        if pending.tool_name != CONFIRMATION_TOOL_NAME {
            warn!(tool_name = %pending.tool_name, "Refusing to route non-confirmation tool");
            return RouteOutcome::failed(
                None,
                RouteError::InvalidToolName {
                    tool_name: pending.tool_name.clone(),
                },
            );
        }

        if let Some(duplex) = transports.duplex {
            return self.route_duplex(pending, decision, &duplex);
        }
        if let Some(stream) = transports.stream {
            return self.route_stream(pending, decision, &stream);
        }

        RouteOutcome::failed(None, RouteError::NoTransport)
    }

    fn route_duplex(
        &self,
        pending: &ToolInvocation,
        decision: &ApprovalDecision,
        handle: &DuplexHandle,
    ) -> RouteOutcome {
        let channel = match handle.upgrade() {
            Some(channel) => channel,
            None => {
                warn!("Duplex channel dropped before the decision could be sent");
                return RouteOutcome::failed(Some(ChannelUsed::Duplex), RouteError::BindingLost);
            }
        };

        let original = match original_function_call(pending) {
            Some(original) => original,
            None => {
                return RouteOutcome::failed(
                    Some(ChannelUsed::Duplex),
                    RouteError::MissingOriginalFunctionCall,
                )
            }
        };

        if !channel.ready_state().is_open() {
            return RouteOutcome::failed(Some(ChannelUsed::Duplex), RouteError::ChannelNotOpen);
        }

        let user_message = decision.reason.clone().unwrap_or_else(|| {
            if decision.approved {
                APPROVED_MESSAGE.to_string()
            } else {
                DENIED_MESSAGE.to_string()
            }
        });
        let result = json!({
            "approved": decision.approved,
            "user_message": user_message,
        });

        if !self.sender.send_tool_result(
            channel.as_ref(),
            &original.tool_call_id,
            Some(&original.tool_name),
            result,
        ) {
            return RouteOutcome::failed(Some(ChannelUsed::Duplex), RouteError::SendFailed);
        }

        info!(
            wrapper_id = %pending.tool_call_id,
            tool_call_id = %original.tool_call_id,
            approved = decision.approved,
            "Routed confirmation over duplex channel"
        );
        RouteOutcome::sent(ChannelUsed::Duplex, original)
    }

    fn route_stream(
        &self,
        pending: &ToolInvocation,
        decision: &ApprovalDecision,
        handle: &StreamHandle,
    ) -> RouteOutcome {
        let sink = match handle.sink.upgrade() {
            Some(sink) => sink,
            None => {
                warn!("Event-stream sink dropped before the decision could be sent");
                return RouteOutcome::failed(
                    Some(ChannelUsed::EventStream),
                    RouteError::BindingLost,
                );
            }
        };

        let address = ToolAddress {
            tool_call_id: pending.tool_call_id.clone(),
            tool_name: pending.tool_name.clone(),
        };
        let output = StreamToolOutput {
            tool_call_id: address.tool_call_id.clone(),
            tool_name: address.tool_name.clone(),
            output: json!({ "confirmed": decision.approved }),
        };

        match sink(output) {
            Ok(()) => {
                debug!(
                    tool_call_id = %address.tool_call_id,
                    confirmed = decision.approved,
                    "Routed confirmation over event stream"
                );
                RouteOutcome::sent(ChannelUsed::EventStream, address)
            }
            Err(msg) => RouteOutcome::failed(
                Some(ChannelUsed::EventStream),
                RouteError::OutputRejected(msg),
            ),
        }
    }
}

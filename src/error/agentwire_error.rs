//! Unified error type for the agentwire client.

use std::fmt;

use super::category::ErrorCategory;
use super::stream::StreamError;
use crate::approval::RouteError;
use crate::config::ConfigError;
use crate::http_stream::HttpStreamError;
use crate::session::ConversationError;
use crate::websocket::WsError;

/// Unified error type.
///
/// Consolidates the per-module errors so the binary and embedding
/// applications can categorize, retry and report them uniformly.
#[derive(Debug)]
pub enum AgentwireError {
    /// Inbound sequence errors (timeouts, malformed frames, backend errors).
    Stream(StreamError),

    /// Duplex transport errors.
    Transport(WsError),

    /// HTTP event-stream errors.
    Http(HttpStreamError),

    /// Confirmation routing failures.
    Route(RouteError),

    /// Invalid local edits to the conversation.
    Conversation(ConversationError),

    /// Configuration and argument errors.
    Config(ConfigError),
}

impl AgentwireError {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AgentwireError::Stream(err) => match err {
                StreamError::ConnectionLost { .. } => ErrorCategory::Network,
                StreamError::ApprovalTimeout { .. } => ErrorCategory::Timeout,
                StreamError::BackendError { .. } => ErrorCategory::Server,
                StreamError::MalformedFrame { .. } | StreamError::SequenceClosed => {
                    ErrorCategory::Protocol
                }
                StreamError::Interrupted { .. } => ErrorCategory::User,
            },
            AgentwireError::Transport(_) => ErrorCategory::Network,
            AgentwireError::Http(err) => match err {
                HttpStreamError::Http(_) => ErrorCategory::Network,
                HttpStreamError::ServerError { status, .. } if *status >= 500 => {
                    ErrorCategory::Server
                }
                HttpStreamError::ServerError { .. } => ErrorCategory::Protocol,
            },
            AgentwireError::Route(err) => match err {
                RouteError::ChannelNotOpen | RouteError::SendFailed | RouteError::BindingLost => {
                    ErrorCategory::Network
                }
                RouteError::NoTransport => ErrorCategory::Configuration,
                RouteError::InvalidToolName { .. }
                | RouteError::MissingOriginalFunctionCall
                | RouteError::OutputRejected(_) => ErrorCategory::Protocol,
            },
            AgentwireError::Conversation(_) => ErrorCategory::User,
            AgentwireError::Config(_) => ErrorCategory::Configuration,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentwireError::Stream(err) => err.is_retryable(),
            AgentwireError::Http(err) => err.is_retryable(),
            AgentwireError::Route(err) => err.is_retryable(),
            AgentwireError::Transport(WsError::SendFailed(_)) => false,
            AgentwireError::Transport(_) => true,
            AgentwireError::Conversation(_) | AgentwireError::Config(_) => false,
        }
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            AgentwireError::Stream(err) => err.user_message(),
            other => format!("{} ({})", other, other.category().recovery_hint()),
        }
    }

    /// Get the recovery hint for this error.
    pub fn recovery_hint(&self) -> &'static str {
        self.category().recovery_hint()
    }
}

impl fmt::Display for AgentwireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentwireError::Stream(err) => write!(f, "{}", err),
            AgentwireError::Transport(err) => write!(f, "{}", err),
            AgentwireError::Http(err) => write!(f, "{}", err),
            AgentwireError::Route(err) => write!(f, "{}", err),
            AgentwireError::Conversation(err) => write!(f, "{}", err),
            AgentwireError::Config(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AgentwireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentwireError::Stream(err) => Some(err),
            AgentwireError::Transport(err) => Some(err),
            AgentwireError::Http(err) => Some(err),
            AgentwireError::Route(err) => Some(err),
            AgentwireError::Conversation(err) => Some(err),
            AgentwireError::Config(err) => Some(err),
        }
    }
}

// ============================================================================
// From implementations for automatic error conversion
// ============================================================================

impl From<StreamError> for AgentwireError {
    fn from(err: StreamError) -> Self {
        AgentwireError::Stream(err)
    }
}

impl From<WsError> for AgentwireError {
    fn from(err: WsError) -> Self {
        AgentwireError::Transport(err)
    }
}

impl From<HttpStreamError> for AgentwireError {
    fn from(err: HttpStreamError) -> Self {
        AgentwireError::Http(err)
    }
}

impl From<RouteError> for AgentwireError {
    fn from(err: RouteError) -> Self {
        AgentwireError::Route(err)
    }
}

impl From<ConversationError> for AgentwireError {
    fn from(err: ConversationError) -> Self {
        AgentwireError::Conversation(err)
    }
}

impl From<ConfigError> for AgentwireError {
    fn from(err: ConfigError) -> Self {
        AgentwireError::Config(err)
    }
}

impl From<reqwest::Error> for AgentwireError {
    fn from(err: reqwest::Error) -> Self {
        AgentwireError::Http(HttpStreamError::Http(err))
    }
}

//! Streaming-related error types.
//!
//! Errors raised while driving an inbound event sequence: broken frames,
//! lost connections, backend-reported errors and expired approval cycles.

use std::fmt;

use crate::sse::FrameError;

/// Stream-specific error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Transport went away while a sequence was active.
    ConnectionLost { message: String },

    /// A frame could not be decoded.
    MalformedFrame { message: String },

    /// No approval-stream-closed arrived within the response timeout.
    ApprovalTimeout { duration_secs: u64 },

    /// The turn was cancelled locally.
    Interrupted { reason: Option<String> },

    /// The inbound sequence was already closed when an event arrived.
    SequenceClosed,

    /// Backend reported an error via an `error` event.
    BackendError { message: String },
}

impl StreamError {
    /// Check if this error is likely transient and can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::ConnectionLost { .. } | StreamError::ApprovalTimeout { .. }
        )
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            StreamError::ConnectionLost { .. } => {
                "Connection to the agent was lost. Attempting to reconnect...".to_string()
            }
            StreamError::MalformedFrame { .. } => {
                "Received invalid data from the agent. Please try again.".to_string()
            }
            StreamError::ApprovalTimeout { duration_secs } => format!(
                "The agent did not respond to the approval within {} seconds. \
                 Send the message again to retry.",
                duration_secs
            ),
            StreamError::Interrupted { reason } => match reason {
                Some(r) => format!("Response interrupted: {}", r),
                None => "Response interrupted.".to_string(),
            },
            StreamError::SequenceClosed => "The response stream has already finished.".to_string(),
            StreamError::BackendError { message } => format!("Agent error: {}", message),
        }
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            StreamError::ConnectionLost { .. } => "E_STREAM_CONN",
            StreamError::MalformedFrame { .. } => "E_STREAM_FRAME",
            StreamError::ApprovalTimeout { .. } => "E_STREAM_APPROVAL_TO",
            StreamError::Interrupted { .. } => "E_STREAM_INTERRUPT",
            StreamError::SequenceClosed => "E_STREAM_CLOSED",
            StreamError::BackendError { .. } => "E_STREAM_BACKEND",
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::ConnectionLost { message } => {
                write!(f, "Stream connection lost: {}", message)
            }
            StreamError::MalformedFrame { message } => write!(f, "Malformed frame: {}", message),
            StreamError::ApprovalTimeout { duration_secs } => {
                write!(f, "Approval response timeout after {} seconds", duration_secs)
            }
            StreamError::Interrupted { reason } => match reason {
                Some(r) => write!(f, "Stream interrupted: {}", r),
                None => write!(f, "Stream interrupted"),
            },
            StreamError::SequenceClosed => write!(f, "Inbound sequence already closed"),
            StreamError::BackendError { message } => write!(f, "Backend error: {}", message),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<FrameError> for StreamError {
    fn from(err: FrameError) -> Self {
        StreamError::MalformedFrame {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_timeout_is_retryable() {
        let err = StreamError::ApprovalTimeout { duration_secs: 60 };
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), "E_STREAM_APPROVAL_TO");
        assert!(err.user_message().contains("60 seconds"));
    }

    #[test]
    fn test_connection_lost_is_retryable() {
        let err = StreamError::ConnectionLost {
            message: "socket closed".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), "E_STREAM_CONN");
    }

    #[test]
    fn test_malformed_frame_not_retryable() {
        let err: StreamError = FrameError::MissingType.into();
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), "E_STREAM_FRAME");
    }

    #[test]
    fn test_backend_error_message() {
        let err = StreamError::BackendError {
            message: "quota exceeded".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.user_message().contains("quota exceeded"));
        assert_eq!(err.to_string(), "Backend error: quota exceeded");
    }

    #[test]
    fn test_interrupted_display() {
        let err = StreamError::Interrupted {
            reason: Some("user cancelled".to_string()),
        };
        assert_eq!(err.to_string(), "Stream interrupted: user cancelled");
        assert_eq!(
            StreamError::Interrupted { reason: None }.to_string(),
            "Stream interrupted"
        );
    }
}

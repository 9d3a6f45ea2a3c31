//! Error category classification for unified error handling.

use std::fmt;

/// High-level categorization of errors for handling decisions.
///
/// Categories drive the retry policy and the hint shown next to the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection, handshake or transport failures.
    /// Generally transient and retryable.
    Network,

    /// Backend reported an error or returned a failure status.
    Server,

    /// The backend did not answer an approval cycle in time.
    /// Retryable: the next turn opens a fresh inbound sequence.
    Timeout,

    /// Malformed protocol data or an invalid local state transition.
    /// Not retryable without a change on one side.
    Protocol,

    /// Invalid input from the user (unknown tool call, bad decision target).
    User,

    /// Missing or invalid configuration.
    Configuration,
}

impl ErrorCategory {
    /// Returns true if errors in this category are generally transient
    /// and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::Server | ErrorCategory::Timeout
        )
    }

    /// Returns a short label for the category suitable for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Server => "server",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::User => "user",
            ErrorCategory::Configuration => "configuration",
        }
    }

    /// Returns suggested recovery actions for this category.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "Check that the agent backend is reachable and try again",
            ErrorCategory::Server => {
                "The backend may be experiencing issues. Please try again later"
            }
            ErrorCategory::Timeout => "Send the message again to restart the approval",
            ErrorCategory::Protocol => {
                "The backend sent data this client does not understand. Check both versions"
            }
            ErrorCategory::User => "Please check your input and try again",
            ErrorCategory::Configuration => "Check your configuration file and flags",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//! Unified error handling.
//!
//! - **Error Categories**: high-level classification for retry decisions
//! - **Stream Errors**: failures of an inbound event sequence
//! - **Unified Error Type**: `AgentwireError` wraps every module's error
//! - **Result Type Alias**: `AgentwireResult<T>`
//!
//! | Category | Description | Retryable |
//! |----------|-------------|-----------|
//! | Network | Connection, handshake, send | Yes |
//! | Server | Backend errors, 5xx | Yes |
//! | Timeout | Approval response deadline | Yes |
//! | Protocol | Malformed frames, bad identifiers | No |
//! | User | Invalid local action | No |
//! | Configuration | Config file, env, flags | No |

mod agentwire_error;
mod category;
mod result;
mod stream;

pub use agentwire_error::AgentwireError;
pub use category::ErrorCategory;
pub use result::AgentwireResult;
pub use stream::StreamError;

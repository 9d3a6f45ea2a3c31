//! Tool approval handling.
//!
//! - `auto_resend` - decides when the conversation goes back to the backend
//! - `router` - delivers approve/deny decisions for confirmation tools

pub mod auto_resend;
pub mod router;

pub use auto_resend::AutoResendDecider;
pub use router::{
    ChannelUsed, ConfirmationRouter, DuplexHandle, RouteError, RouteOutcome, StreamHandle,
    StreamToolOutput, ToolAddress, ToolOutputSink, Transports, CONFIRMATION_TOOL_NAME,
};

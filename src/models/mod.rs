//! Conversation data model: messages, parts, tool invocations and turns.

pub mod message;
pub mod tool;
pub mod turn;

pub use message::{Message, Part, Role, TextPart, TEXT_PART, TOOL_INVOCATION_PART};
pub use tool::{Approval, ApprovalDecision, PartError, ToolInvocation, ToolState};
pub use turn::{Trigger, TurnRequest};

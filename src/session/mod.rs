//! Client-side conversation state.

pub mod conversation;

pub use conversation::{Conversation, ConversationError};

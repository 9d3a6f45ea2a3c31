//! Inbound frame codec
//!
//! Decodes the line-oriented stream the agent backend writes on both
//! transports:
//! - `data: <json>` - one protocol event, discriminated by its `type` field
//! - `data: [DONE]` - terminal sentinel closing the turn
//! - Empty line - frame separator
//! - Lines starting with `:` - comments (ignored)
//!
//! # Module structure
//! - `events` - Event type definitions (ProtocolEvent, FrameLine, FrameError)
//! - `parser` - Parsing logic (FrameDecoder, parse_frame_line, parse_frame_payload)

mod events;
mod parser;

pub use events::{FrameError, FrameLine, ProtocolEvent, KNOWN_EVENT_TYPES};
pub use parser::{parse_frame_line, parse_frame_payload, FrameDecoder, DATA_PREFIX, DONE_SENTINEL};

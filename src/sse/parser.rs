//! Incremental frame decoder.
//!
//! Bytes are buffered until a newline arrives, so frames split across
//! chunk boundaries (including split UTF-8 sequences) decode exactly as
//! they would from a single contiguous buffer.

use bytes::BytesMut;
use serde_json::Value;
use tracing::{debug, warn};

use super::events::{FrameError, FrameLine, ProtocolEvent, KNOWN_EVENT_TYPES};

/// Prefix of a data line.
pub const DATA_PREFIX: &str = "data:";
/// Literal end-of-turn marker.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Classify a single line (without its trailing newline).
pub fn parse_frame_line(line: &str) -> FrameLine {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return FrameLine::Empty;
    }

    if let Some(stripped) = line.strip_prefix(':') {
        return FrameLine::Comment(stripped.trim().to_string());
    }

    if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
        let data = rest.trim();
        if data == DONE_SENTINEL {
            return FrameLine::Done;
        }
        return FrameLine::Data(data.to_string());
    }

    if line.trim() == DONE_SENTINEL {
        return FrameLine::Done;
    }

    FrameLine::Comment(line.to_string())
}

/// Decode the JSON payload of a data line into a typed event.
pub fn parse_frame_payload(data: &str) -> Result<ProtocolEvent, FrameError> {
    let value: Value = serde_json::from_str(data).map_err(|e| FrameError::InvalidJson {
        source: e.to_string(),
    })?;

    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?
        .to_string();

    if !KNOWN_EVENT_TYPES.contains(&event_type.as_str()) {
        return Ok(ProtocolEvent::Passthrough(value));
    }

    serde_json::from_value(value).map_err(|e| FrameError::InvalidPayload {
        event_type,
        source: e.to_string(),
    })
}

/// Stateful decoder turning raw chunks into protocol events.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of the current, not yet terminated line
    buffer: BytesMut,
    /// Frames dropped because they could not be decoded
    skipped: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it.
    ///
    /// Malformed frames are logged and skipped; they never abort the stream.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(newline + 1);
            self.decode_line(&line[..newline], &mut events);
        }
        events
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let line = self.buffer.split();
            self.decode_line(&line, &mut events);
        }
        events
    }

    /// Drop any partial line.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes waiting for a newline.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Number of frames skipped as malformed since creation.
    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }

    fn decode_line(&mut self, raw: &[u8], events: &mut Vec<ProtocolEvent>) {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                self.skip(FrameError::InvalidUtf8(e.to_string()));
                return;
            }
        };

        match parse_frame_line(line) {
            FrameLine::Empty => {}
            FrameLine::Comment(text) => {
                if !text.is_empty() {
                    debug!("Ignoring non-data line: {}", text);
                }
            }
            FrameLine::Done => events.push(ProtocolEvent::Done),
            FrameLine::Data(data) => match parse_frame_payload(&data) {
                Ok(event) => events.push(event),
                Err(e) => self.skip(e),
            },
        }
    }

    fn skip(&mut self, error: FrameError) {
        self.skipped += 1;
        warn!(skipped = self.skipped, "Skipping malformed frame: {}", error);
    }
}

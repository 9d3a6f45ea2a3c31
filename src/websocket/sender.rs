//! Outbound frame construction.
//!
//! [`EventSender`] is stateless: every call receives the channel to write
//! to, so a channel swapped in after a reconnect is picked up on the next
//! call. Writes are at-most-once. When the channel is not open the call is a
//! silent no-op and returns `false`; surfacing the connectivity problem is
//! the caller's job.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::models::TurnRequest;
use crate::traits::DuplexChannel;

use super::messages::{AudioAction, AudioFormat, OutgoingEnvelope, OutgoingEvent};

#[derive(Debug, Clone, Copy, Default)]
pub struct EventSender;

impl EventSender {
    pub fn new() -> Self {
        Self
    }

    /// Write one event if the channel is open. Returns whether it was queued.
    pub fn send(&self, channel: &dyn DuplexChannel, event: OutgoingEvent) -> bool {
        let state = channel.ready_state();
        if !state.is_open() {
            debug!(
                event_type = event.type_name(),
                ?state,
                "Channel not open, dropping outbound frame"
            );
            return false;
        }

        let event_type = event.type_name();
        let frame = match OutgoingEnvelope::new(event).encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize {} frame: {}", event_type, e);
                return false;
            }
        };

        match channel.send_text(frame) {
            Ok(()) => {
                debug!(event_type, "Sent frame");
                true
            }
            Err(e) => {
                warn!(event_type, "Failed to send frame: {}", e);
                false
            }
        }
    }

    /// Submit a conversation turn.
    pub fn send_turn(&self, channel: &dyn DuplexChannel, request: &TurnRequest) -> bool {
        self.send(channel, OutgoingEvent::from(request))
    }

    /// Report the result of one tool call.
    pub fn send_tool_result(
        &self,
        channel: &dyn DuplexChannel,
        tool_call_id: &str,
        tool_name: Option<&str>,
        result: Value,
    ) -> bool {
        self.send(
            channel,
            OutgoingEvent::ToolResult {
                tool_call_id: tool_call_id.to_string(),
                tool_name: tool_name.map(str::to_string),
                result,
            },
        )
    }

    pub fn start_audio(&self, channel: &dyn DuplexChannel) -> bool {
        self.send(
            channel,
            OutgoingEvent::AudioControl {
                action: AudioAction::Start,
            },
        )
    }

    pub fn stop_audio(&self, channel: &dyn DuplexChannel) -> bool {
        self.send(
            channel,
            OutgoingEvent::AudioControl {
                action: AudioAction::Stop,
            },
        )
    }

    /// Forward a chunk of raw PCM; it is base64-encoded on the wire.
    pub fn send_audio_chunk(
        &self,
        channel: &dyn DuplexChannel,
        pcm: &[u8],
        format: AudioFormat,
    ) -> bool {
        self.send(
            channel,
            OutgoingEvent::AudioChunk {
                chunk: STANDARD.encode(pcm),
                sample_rate: format.sample_rate,
                channels: format.channels,
                bit_depth: format.bit_depth,
            },
        )
    }

    pub fn send_interrupt(&self, channel: &dyn DuplexChannel, reason: Option<&str>) -> bool {
        self.send(
            channel,
            OutgoingEvent::Interrupt {
                reason: reason.map(str::to_string),
            },
        )
    }

    pub fn send_ping(&self, channel: &dyn DuplexChannel) -> bool {
        self.send(channel, OutgoingEvent::Ping)
    }
}

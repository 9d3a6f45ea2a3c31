use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::{Message, Trigger, TurnRequest};

/// Version stamped on every outbound frame.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Audio session control action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioAction {
    Start,
    Stop,
}

/// PCM format of forwarded audio chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            bit_depth: 16,
        }
    }
}

/// Outgoing frames (sent to the backend over the duplex channel)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutgoingEvent {
    /// Full conversation submission
    Message {
        id: String,
        messages: Vec<Message>,
        trigger: Trigger,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Result for a single tool call
    ToolResult {
        tool_call_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        result: Value,
    },
    AudioControl {
        action: AudioAction,
    },
    /// Base64-encoded PCM audio
    AudioChunk {
        chunk: String,
        sample_rate: u32,
        channels: u16,
        bit_depth: u16,
    },
    /// Cancel the in-flight turn
    Interrupt {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Keepalive; the envelope timestamp is the ping timestamp
    Ping,
}

impl OutgoingEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            OutgoingEvent::Message { .. } => "message",
            OutgoingEvent::ToolResult { .. } => "tool_result",
            OutgoingEvent::AudioControl { .. } => "audio_control",
            OutgoingEvent::AudioChunk { .. } => "audio_chunk",
            OutgoingEvent::Interrupt { .. } => "interrupt",
            OutgoingEvent::Ping => "ping",
        }
    }
}

impl From<&TurnRequest> for OutgoingEvent {
    fn from(request: &TurnRequest) -> Self {
        OutgoingEvent::Message {
            id: request.id.clone(),
            messages: request.messages.clone(),
            trigger: request.trigger,
            message_id: request.message_id.clone(),
        }
    }
}

/// An outgoing event stamped with protocol version and send time.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEnvelope {
    pub event: OutgoingEvent,
    pub version: &'static str,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
}

impl OutgoingEnvelope {
    /// Wrap an event with a fresh timestamp.
    pub fn new(event: OutgoingEvent) -> Self {
        Self::at(event, Utc::now().timestamp_millis())
    }

    pub fn at(event: OutgoingEvent, timestamp: i64) -> Self {
        Self {
            event,
            version: PROTOCOL_VERSION,
            timestamp,
        }
    }

    /// Serialise to the `{type, version, timestamp, ...}` wire form.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let mut body = match serde_json::to_value(&self.event)? {
            Value::Object(map) => map,
            // Internally tagged enums always serialise to objects.
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other);
                map
            }
        };
        body.insert(
            "version".to_string(),
            Value::String(self.version.to_string()),
        );
        body.insert("timestamp".to_string(), Value::from(self.timestamp));
        Ok(Value::Object(body))
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        self.to_value().map(|v| v.to_string())
    }
}

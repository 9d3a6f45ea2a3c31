use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::tool::{PartError, ToolInvocation};

/// `type` tag of a text part.
pub const TEXT_PART: &str = "text";
/// `type` tag of a tool invocation part.
pub const TOOL_INVOCATION_PART: &str = "tool-invocation";

/// Role of a message in a conversation. Immutable after creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Body of a text part.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextPart {
    pub text: String,
}

/// One element of a message body.
///
/// Parts with a `type` other than `text` or `tool-invocation` are kept
/// verbatim in [`Part::Other`] so they survive a resend unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(TextPart),
    ToolInvocation(ToolInvocation),
    Other(Value),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(TextPart { text: text.into() })
    }

    pub fn as_tool_invocation(&self) -> Option<&ToolInvocation> {
        match self {
            Part::ToolInvocation(inv) => Some(inv),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct Tagged<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Part::Text(body) => Tagged {
                kind: TEXT_PART,
                body,
            }
            .serialize(serializer),
            Part::ToolInvocation(body) => Tagged {
                kind: TOOL_INVOCATION_PART,
                body,
            }
            .serialize(serializer),
            Part::Other(value) => value.serialize(serializer),
        }
    }
}

impl TryFrom<Value> for Part {
    type Error = PartError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value.get("type").and_then(Value::as_str) {
            Some(TEXT_PART) => {
                let text = value
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or(PartError::MissingField {
                        part: TEXT_PART,
                        field: "text",
                    })?;
                Ok(Part::text(text))
            }
            Some(TOOL_INVOCATION_PART) => serde_json::from_value::<ToolInvocation>(value)
                .map(Part::ToolInvocation)
                .map_err(|e| PartError::InvalidToolInvocation(e.to_string())),
            _ => Ok(Part::Other(value)),
        }
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Part::try_from(value).map_err(D::Error::custom)
    }
}

/// A single conversation message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            parts: Vec::new(),
        }
    }

    /// A user message with a single text part and a fresh id.
    pub fn user_text(text: impl Into<String>) -> Self {
        let mut message = Self::new(uuid::Uuid::new_v4().to_string(), Role::User);
        message.parts.push(Part::text(text));
        message
    }

    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// True once the message holds any text part.
    pub fn has_text(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Text(_)))
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(Part::as_tool_invocation)
    }

    pub fn tool_invocation(&self, tool_call_id: &str) -> Option<&ToolInvocation> {
        self.tool_invocations()
            .find(|inv| inv.tool_call_id == tool_call_id)
    }

    pub fn tool_invocation_mut(&mut self, tool_call_id: &str) -> Option<&mut ToolInvocation> {
        self.parts.iter_mut().find_map(|p| match p {
            Part::ToolInvocation(inv) if inv.tool_call_id == tool_call_id => Some(inv),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolState;
    use serde_json::json;

    #[test]
    fn test_deserialize_mixed_parts() {
        let msg: Message = serde_json::from_value(json!({
            "id": "m1",
            "role": "assistant",
            "parts": [
                {"type": "step-start"},
                {"type": "text", "text": "Let me check."},
                {
                    "type": "tool-invocation",
                    "toolCallId": "c1",
                    "toolName": "get_weather",
                    "input": {"city": "Oslo"},
                    "state": "input-available"
                }
            ]
        }))
        .unwrap();

        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.parts.len(), 3);
        assert!(matches!(msg.parts[0], Part::Other(_)));
        assert!(msg.has_text());
        let inv = msg.tool_invocation("c1").unwrap();
        assert_eq!(inv.state, ToolState::InputAvailable);
    }

    #[test]
    fn test_other_part_roundtrips_verbatim() {
        let raw = json!({"type": "file", "url": "data:,x", "mediaType": "text/plain"});
        let part: Part = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&part).unwrap(), raw);
    }

    #[test]
    fn test_serialize_tool_part_has_type_tag() {
        let part = Part::ToolInvocation(crate::models::ToolInvocation::new("c1", "pay"));
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["type"], "tool-invocation");
        assert_eq!(value["toolCallId"], "c1");
        assert_eq!(value["toolName"], "pay");
    }

    #[test]
    fn test_text_part_without_text_rejected() {
        let result = serde_json::from_value::<Part>(json!({"type": "text"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_role_rejected() {
        let result = serde_json::from_value::<Message>(json!({
            "id": "m1",
            "role": "tool",
            "parts": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_user_text_helper() {
        let msg = Message::user_text("hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "hello");
        assert!(!msg.id.is_empty());
    }
}

//! Outbound turn requests shared by both transports.

use serde::{Deserialize, Serialize};

use super::message::Message;

/// Why a turn is being submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    SubmitMessage,
    RegenerateMessage,
}

/// A full conversation submission.
///
/// Serialises to `{id, messages, trigger, messageId?}`, which is both the
/// HTTP request body and the body of the duplex `message` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// Conversation (chat) id
    pub id: String,
    pub messages: Vec<Message>,
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl TurnRequest {
    pub fn submit(chat_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: chat_id.into(),
            messages,
            trigger: Trigger::SubmitMessage,
            message_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_turn_request() {
        let request = TurnRequest::submit("chat-1", vec![Message::user_text("hi")]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["id"], "chat-1");
        assert_eq!(value["trigger"], "submit-message");
        assert_eq!(value["messages"][0]["role"], "user");
        assert!(value.get("messageId").is_none());
    }

    #[test]
    fn test_message_id_is_camel_case() {
        let mut request = TurnRequest::submit("chat-1", vec![]);
        request.trigger = Trigger::RegenerateMessage;
        request.message_id = Some("m-7".to_string());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messageId"], "m-7");
        assert_eq!(value["trigger"], "regenerate-message");
    }
}

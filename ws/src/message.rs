use crate::connection::UserId;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a group chat (room).
pub type ChatId = i32;

/// Trait for getting the wire name of a message type
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

/// Immutable outbound byte payload. Cloning is cheap, so one serialized message
/// can be enqueued to any number of connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Bytes);

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serializes any outbound message into a payload.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self::from)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self {
        Self(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self(Bytes::from(text))
    }
}

/// Application messages sent by clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    DirectMessage {
        receiver_id: UserId,
        content: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    GroupMessage {
        chat_id: ChatId,
        content: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    ChatOpened {
        chat_id: ChatId,
    },
    ChatClosed {
        chat_id: ChatId,
    },
}

impl EventType for Inbound {
    fn event_type(&self) -> &'static str {
        match self {
            Inbound::DirectMessage { .. } => "direct_message",
            Inbound::GroupMessage { .. } => "group_message",
            Inbound::ChatOpened { .. } => "chat_opened",
            Inbound::ChatClosed { .. } => "chat_closed",
        }
    }
}

/// Messages pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    DirectMessage {
        sender_id: UserId,
        receiver_id: UserId,
        content: String,
        timestamp: DateTime<Utc>,
    },
    GroupMessage {
        sender_id: UserId,
        chat_id: ChatId,
        content: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        reason: ErrorReason,
    },
}

impl EventType for Outbound {
    fn event_type(&self) -> &'static str {
        match self {
            Outbound::DirectMessage { .. } => "direct_message",
            Outbound::GroupMessage { .. } => "group_message",
            Outbound::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    PersistenceFailed,
    InvalidMessage,
}

/// Where a chat message is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    User(UserId),
    Chat(ChatId),
}

/// A chat message as handed to the message store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender_id: UserId,
    pub destination: Destination,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    /// The outbound representation delivered to recipients.
    pub fn to_outbound(&self) -> Outbound {
        match self.destination {
            Destination::User(receiver_id) => Outbound::DirectMessage {
                sender_id: self.sender_id,
                receiver_id,
                content: self.content.clone(),
                timestamp: self.sent_at,
            },
            Destination::Chat(chat_id) => Outbound::GroupMessage {
                sender_id: self.sender_id,
                chat_id,
                content: self.content.clone(),
                timestamp: self.sent_at,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub event: Outbound,
    pub scope: MessageScope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageScope {
    /// Send to all connections for a specific user
    User { user_id: UserId },
    /// Send to all connected users
    Broadcast,
}

impl From<Destination> for MessageScope {
    fn from(destination: Destination) -> Self {
        match destination {
            Destination::User(user_id) => MessageScope::User { user_id },
            // Rooms resolve to a registry-wide broadcast
            Destination::Chat(_) => MessageScope::Broadcast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_direct_message_without_request_id() {
        let inbound: Inbound =
            serde_json::from_str(r#"{"type":"direct_message","receiver_id":7,"content":"hi"}"#)
                .unwrap();
        assert_eq!(
            inbound,
            Inbound::DirectMessage {
                receiver_id: 7,
                content: "hi".to_string(),
                request_id: None,
            }
        );
    }

    #[test]
    fn rejects_unknown_message_type() {
        let result = serde_json::from_str::<Inbound>(r#"{"type":"typing","chat_id":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn outbound_direct_message_uses_flat_field_names() {
        let sent_at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let message = ChatMessage {
            sender_id: 3,
            destination: Destination::User(7),
            content: "hi".to_string(),
            sent_at,
        };

        let value = serde_json::to_value(message.to_outbound()).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "direct_message",
                "sender_id": 3,
                "receiver_id": 7,
                "content": "hi",
                "timestamp": "2024-05-01T10:00:00Z"
            })
        );
    }

    #[test]
    fn error_without_request_id_omits_the_field() {
        let value = serde_json::to_value(Outbound::Error {
            request_id: None,
            reason: ErrorReason::PersistenceFailed,
        })
        .unwrap();
        assert_eq!(value, json!({"type": "error", "reason": "persistence_failed"}));
    }

    #[test]
    fn chat_destinations_resolve_to_broadcast() {
        assert_eq!(MessageScope::from(Destination::Chat(4)), MessageScope::Broadcast);
        assert_eq!(
            MessageScope::from(Destination::User(9)),
            MessageScope::User { user_id: 9 }
        );
    }
}

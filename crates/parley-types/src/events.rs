use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MessageSender;

/// Events sent FROM client TO relay. Event names match the original wire
/// contract, so a client speaks `{"type": "chat message", "data": "hi"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientEvent {
    /// Authenticate the connection. Must be the first event; ignored after
    /// the handshake has completed.
    #[serde(rename = "auth")]
    Auth { token: String },

    /// The sender started or stopped typing.
    #[serde(rename = "typing")]
    Typing(bool),

    /// Post a chat message.
    #[serde(rename = "chat message")]
    ChatMessage(String),

    /// Flag a stored message as read.
    #[serde(rename = "markAsRead")]
    MarkAsRead(i64),
}

/// Events sent FROM relay TO clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// Another connection's typing state changed. Never echoed to the
    /// connection that produced it.
    #[serde(rename = "userTyping", rename_all = "camelCase")]
    UserTyping { user: String, is_typing: bool },

    /// A chat message was persisted and is being fanned out to everyone,
    /// the sender included.
    #[serde(rename = "chat message", rename_all = "camelCase")]
    ChatMessage {
        id: i64,
        content: String,
        sender: MessageSender,
        timestamp: DateTime<Utc>,
        is_delivered: bool,
    },

    /// A stored message was flagged as read.
    #[serde(rename = "messageRead")]
    MessageRead(i64),

    /// Unicast failure notice for the originating connection only.
    #[serde(rename = "error")]
    Error(String),
}

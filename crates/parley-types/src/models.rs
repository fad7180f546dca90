use serde::{Deserialize, Serialize};

/// Reserved username for relay-originated messages. Senders with this
/// username are flagged `isBot` on the wire; registration under it is denied.
pub const SYSTEM_USERNAME: &str = "Server";

/// The authenticated principal attached to a connection after handshake.
/// Resolved once per connection and immutable for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub username: String,
}

/// Sender block embedded in outbound `chat message` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    pub id: i64,
    pub username: String,
    pub is_bot: bool,
}

impl MessageSender {
    pub fn new(id: i64, username: String) -> Self {
        let is_bot = username == SYSTEM_USERNAME;
        Self { id, username, is_bot }
    }
}

impl From<&Identity> for MessageSender {
    fn from(identity: &Identity) -> Self {
        Self::new(identity.id, identity.username.clone())
    }
}

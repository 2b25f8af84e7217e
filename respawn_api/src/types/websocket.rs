use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events the client sends to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum ClientToServerEvent {
    Authenticate { token: String },
    Ping { data: i64 },
}

/// Server → client events, based on the Revolt (Bonfire) protocol.
///
/// Only the events the bot reacts to are typed; everything else lands in
/// [`ServerToClientEvent::Unknown`] instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum ServerToClientEvent {
    /// Server responded with an error on authentication or other issue.
    Error { error: String },
    /// Connection has been authenticated successfully.
    Authenticated,
    /// The current session has been invalidated or reset.
    Logout,
    /// A bulk event containing multiple sub-events.
    Bulk { v: Vec<ServerToClientEvent> },
    Pong { data: i64 },

    /// Initial state for the session.
    Ready {
        #[serde(default)]
        users: Vec<Value>,
        #[serde(default)]
        servers: Vec<Value>,
        #[serde(default)]
        channels: Vec<Value>,
    },

    // -- MESSAGE EVENTS --
    Message {
        #[serde(rename = "_id")]
        id: String,
        channel: String,
        author: String,
        content: Option<String>,
        #[serde(flatten)]
        extra: Value,
    },
    MessageReact {
        id: String,
        channel_id: String,
        user_id: String,
        emoji_id: String,
    },

    // -- CHANNEL EVENTS --
    ChannelDelete { id: String },

    #[serde(other)]
    Unknown,
}

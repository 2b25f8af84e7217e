use async_trait::async_trait;
use serde_json::Value;

use crate::{
    client::RevoltClient,
    types::{message::Message, user::User, websocket::ServerToClientEvent},
};

/// Callbacks for gateway events. Every method has an empty default, so
/// implementors only override what they care about.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Called for *every* event that the server sends, before the specific hook.
    async fn on_event(&self, _client: &RevoltClient, _event: &ServerToClientEvent) {}

    /// Called when an "Error" event is received (e.g. a failed authentication).
    async fn on_error_event(&self, _client: &RevoltClient, _error_id: &str) {}

    /// Called when the connection has been authenticated.
    async fn on_authenticated(&self, _client: &RevoltClient) {}

    /// Called when a "Ready" event is received (**includes full payload**).
    async fn on_ready(&self, _client: &RevoltClient, _ready: &ReadyEvent) {}

    /// Called when the server notifies us of a new message.
    async fn on_message(&self, _client: &RevoltClient, _message: &Message) {}

    /// Called when someone adds a reaction to a message.
    async fn on_message_react(&self, _client: &RevoltClient, _react: &MessageReactEvent) {}

    /// Called when a channel is deleted.
    async fn on_channel_delete(&self, _client: &RevoltClient, _delete: &ChannelDeleteEvent) {}
}

/// Data for a "Ready" event.
#[derive(Debug, Clone)]
pub struct ReadyEvent {
    pub users: Vec<Value>,
    pub servers: Vec<Value>,
    pub channels: Vec<Value>,
}

impl ReadyEvent {
    /// The account this connection is authenticated as, if present.
    pub fn own_user(&self) -> Option<User> {
        self.users
            .iter()
            .filter_map(|v| serde_json::from_value::<User>(v.clone()).ok())
            .find(User::is_self)
    }

    /// Every user in the payload that parses.
    pub fn known_users(&self) -> impl Iterator<Item = User> + '_ {
        self.users
            .iter()
            .filter_map(|v| serde_json::from_value::<User>(v.clone()).ok())
    }
}

/// Data for a "MessageReact" event.
#[derive(Debug, Clone)]
pub struct MessageReactEvent {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    pub emoji_id: String,
}

/// Data for a "ChannelDelete" event.
#[derive(Debug, Clone)]
pub struct ChannelDeleteEvent {
    pub id: String,
}

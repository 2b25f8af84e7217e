//! Gateway events → facade calls → chat replies.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use respawn_api::{
    ChannelDeleteEvent, EventHandler, Message, MessageReactEvent, ReadyEvent, RevoltClient,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    dispatch::{PromptBook, RevoltDispatcher},
    facade::{Facade, Origin, Reply},
    preferences::Preferences,
};

#[derive(Clone)]
pub struct BotHandler {
    facade: Facade,
    dispatcher: RevoltDispatcher,
    prompts: PromptBook,
    prefs: Arc<Preferences>,
    own_id: Arc<Mutex<Option<String>>>,
    /// User id → display name, filled from `Ready` and incoming messages.
    names: Arc<Mutex<HashMap<String, String>>>,
}

impl BotHandler {
    pub fn new(
        facade: Facade,
        dispatcher: RevoltDispatcher,
        prompts: PromptBook,
        prefs: Arc<Preferences>,
    ) -> Self {
        Self {
            facade,
            dispatcher,
            prompts,
            prefs,
            own_id: Arc::new(Mutex::new(None)),
            names: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn is_self(&self, user_id: &str) -> bool {
        self.own_id.lock().await.as_deref() == Some(user_id)
    }

    /// Known display name, or a mention that Revolt renders as one.
    async fn display_name(&self, user_id: &str) -> String {
        self.names
            .lock()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| format!("<@{user_id}>"))
    }

    async fn send_reply(&self, channel: &str, reply: Reply, reply_to: Option<&Message>) {
        if let Err(e) = self
            .dispatcher
            .post(channel, reply.text, reply.prompt, reply_to)
            .await
        {
            warn!(channel = %channel, error = %e, "failed to send reply");
        }
    }
}

#[async_trait]
impl EventHandler for BotHandler {
    async fn on_error_event(&self, _client: &RevoltClient, error_id: &str) {
        error!(error = %error_id, "gateway error");
    }

    async fn on_authenticated(&self, _client: &RevoltClient) {
        info!("authenticated with the gateway");
    }

    async fn on_ready(&self, _client: &RevoltClient, ready: &ReadyEvent) {
        match ready.own_user() {
            Some(me) => {
                info!(id = %me.id, name = %me.shown_name(), "bot is ready");
                *self.own_id.lock().await = Some(me.id);
            }
            None => warn!("could not determine own user id from Ready event"),
        }

        let mut names = self.names.lock().await;
        for user in ready.known_users() {
            names.insert(user.id.clone(), user.shown_name().to_string());
        }
        debug!(users = names.len(), channels = ready.channels.len(), "ready payload cached");
    }

    async fn on_message(&self, _client: &RevoltClient, message: &Message) {
        if message.from_bot() || self.is_self(&message.author).await {
            return;
        }
        let Some(content) = message.content.as_deref() else {
            return;
        };

        if let Some(user) = &message.user {
            self.names
                .lock()
                .await
                .insert(user.id.clone(), user.shown_name().to_string());
        }
        let actor = self.display_name(&message.author).await;
        let origin = Origin {
            channel: &message.channel,
            actor: &actor,
        };

        if let Some(reply) = self.facade.handle_text(content, origin).await {
            self.send_reply(&message.channel, reply, Some(message)).await;
        }
    }

    async fn on_message_react(&self, _client: &RevoltClient, react: &MessageReactEvent) {
        if self.is_self(&react.user_id).await {
            return;
        }
        let Some(prompt) = self.prompts.lookup(&react.id).await else {
            return;
        };
        if react.emoji_id != self.dispatcher.emoji_for(prompt.action) {
            debug!(emoji = %react.emoji_id, message = %react.id, "reaction is not a prompt answer");
            return;
        }
        // Someone else may have answered a single-use prompt first.
        let Some(prompt) = self.prompts.claim(&react.id).await else {
            return;
        };

        let actor = self.display_name(&react.user_id).await;
        let origin = Origin {
            channel: &react.channel_id,
            actor: &actor,
        };
        let reply = self.facade.react(&prompt, origin).await;
        self.send_reply(&react.channel_id, reply, None).await;
    }

    async fn on_channel_delete(&self, _client: &RevoltClient, delete: &ChannelDeleteEvent) {
        let cancelled = self.facade.engine().cancel_channel(&delete.id).await;
        if !cancelled.is_empty() {
            info!(channel = %delete.id, bosses = ?cancelled, "channel deleted, timers dropped");
        }
        if self.prefs.clear_status_channel(&delete.id).await {
            info!(channel = %delete.id, "status channel deleted");
        }
    }
}

//! Delivery of timer alerts to chat, and the bookkeeping that lets a
//! reaction on a delivered message find its way back to a boss.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use respawn_api::{DataMessageSend, Message, MessagesApi, RevoltClient};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    engine::{TimerEntry, WarningThreshold},
    error::DispatchError,
    preferences::Preferences,
    render::Render,
};

/// How many prompt messages are remembered before the oldest are dropped.
const PROMPT_CAPACITY: usize = 512;

/// Receives alerts from the timer engine. Implementations are called on
/// detached tasks, so they may take as long as they need.
#[async_trait]
pub trait AlertDispatcher: Send + Sync + 'static {
    async fn notify_warning(
        &self,
        entry: &TimerEntry,
        threshold: &WarningThreshold,
    ) -> Result<(), DispatchError>;

    /// `late` is set when the spawn time passed while the bot was offline.
    async fn notify_spawn(&self, entry: &TimerEntry, late: bool) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAction {
    /// Reacting reports the boss dead.
    Kill,
    /// Reacting restarts the running timer.
    Reset,
}

/// What a reaction on a particular bot message means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub boss: String,
    pub action: PromptAction,
}

impl Prompt {
    pub fn kill(boss: impl Into<String>) -> Self {
        Self {
            boss: boss.into(),
            action: PromptAction::Kill,
        }
    }

    pub fn reset(boss: impl Into<String>) -> Self {
        Self {
            boss: boss.into(),
            action: PromptAction::Reset,
        }
    }
}

#[derive(Debug, Default)]
struct PromptLog {
    by_message: HashMap<String, Prompt>,
    order: VecDeque<String>,
}

/// Message id → [`Prompt`] for recently posted messages.
#[derive(Debug, Clone, Default)]
pub struct PromptBook {
    log: Arc<Mutex<PromptLog>>,
}

impl PromptBook {
    pub async fn record(&self, message_id: &str, prompt: Prompt) {
        let mut log = self.log.lock().await;
        if log
            .by_message
            .insert(message_id.to_string(), prompt)
            .is_none()
        {
            log.order.push_back(message_id.to_string());
        }
        while log.order.len() > PROMPT_CAPACITY {
            if let Some(oldest) = log.order.pop_front() {
                log.by_message.remove(&oldest);
            }
        }
    }

    pub async fn lookup(&self, message_id: &str) -> Option<Prompt> {
        self.log.lock().await.by_message.get(message_id).cloned()
    }

    /// The prompt a reaction on `message_id` answers. Kill prompts are
    /// single-use: the first claim removes them.
    pub async fn claim(&self, message_id: &str) -> Option<Prompt> {
        let mut log = self.log.lock().await;
        let prompt = log.by_message.get(message_id)?.clone();
        if prompt.action == PromptAction::Kill {
            log.by_message.remove(message_id);
            log.order.retain(|id| id != message_id);
        }
        Some(prompt)
    }

    pub async fn count(&self) -> usize {
        self.log.lock().await.by_message.len()
    }
}

/// Posts alerts to Revolt channels.
#[derive(Debug, Clone)]
pub struct RevoltDispatcher {
    client: RevoltClient,
    render: Arc<Render>,
    prefs: Arc<Preferences>,
    prompts: PromptBook,
}

impl RevoltDispatcher {
    pub fn new(
        client: RevoltClient,
        render: Arc<Render>,
        prefs: Arc<Preferences>,
        prompts: PromptBook,
    ) -> Self {
        Self {
            client,
            render,
            prefs,
            prompts,
        }
    }

    /// Post `text` to `channel_id`. With a prompt, the matching reaction is
    /// offered under the message and remembered for routing.
    pub async fn post(
        &self,
        channel_id: &str,
        text: String,
        prompt: Option<Prompt>,
        reply_to: Option<&Message>,
    ) -> Result<Message, DispatchError> {
        let mut body = DataMessageSend::text(text);
        if let Some(message) = reply_to {
            body = body.in_reply_to(message);
        }
        if let Some(prompt) = &prompt {
            body = body.with_reactions([self.emoji_for(prompt.action)]);
        }

        let sent = self.client.send_message(channel_id, body).await?;
        if let Some(prompt) = prompt {
            debug!(message = %sent.id, boss = %prompt.boss, action = ?prompt.action, "prompt posted");
            self.prompts.record(&sent.id, prompt).await;
        }
        Ok(sent)
    }

    pub fn emoji_for(&self, action: PromptAction) -> &str {
        match action {
            PromptAction::Kill => &self.render.kill_emoji,
            PromptAction::Reset => &self.render.reset_emoji,
        }
    }
}

#[async_trait]
impl AlertDispatcher for RevoltDispatcher {
    async fn notify_warning(
        &self,
        entry: &TimerEntry,
        threshold: &WarningThreshold,
    ) -> Result<(), DispatchError> {
        let offset = self.prefs.utc_offset().await;
        let text = self.render.warning(entry, threshold, offset);
        self.post(&entry.channel_ref, text, Some(Prompt::reset(&entry.name)), None)
            .await?;
        Ok(())
    }

    async fn notify_spawn(&self, entry: &TimerEntry, late: bool) -> Result<(), DispatchError> {
        let offset = self.prefs.utc_offset().await;
        let text = self.render.spawn(entry, late, offset);
        self.post(&entry.channel_ref, text, Some(Prompt::kill(&entry.name)), None)
            .await?;
        Ok(())
    }
}

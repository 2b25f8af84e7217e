//! Turns chat commands and reaction clicks into timer operations and the
//! replies that acknowledge them. Knows nothing about the transport.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    commands::{next_occurrence, Command, CommandParser},
    dispatch::{Prompt, PromptAction},
    engine::{TimerEngine, TimerEntry},
    error::TimerError,
    preferences::Preferences,
    render::Render,
};

/// Where a command or reaction came from.
#[derive(Debug, Clone, Copy)]
pub struct Origin<'a> {
    pub channel: &'a str,
    /// Display name of the user, recorded as the timer's last actor.
    pub actor: &'a str,
}

/// A message to post back, optionally carrying a reaction prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub prompt: Option<Prompt>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt: None,
        }
    }

    fn with_prompt(text: String, prompt: Prompt) -> Self {
        Self {
            text,
            prompt: Some(prompt),
        }
    }
}

#[derive(Clone)]
pub struct Facade {
    engine: TimerEngine,
    prefs: Arc<Preferences>,
    render: Arc<Render>,
    parser: Arc<CommandParser>,
}

impl Facade {
    pub fn new(
        engine: TimerEngine,
        prefs: Arc<Preferences>,
        render: Arc<Render>,
        parser: CommandParser,
    ) -> Self {
        Self {
            engine,
            prefs,
            render,
            parser: Arc::new(parser),
        }
    }

    pub fn engine(&self) -> &TimerEngine {
        &self.engine
    }

    /// `None` when the text is ordinary chat.
    pub async fn handle_text(&self, content: &str, origin: Origin<'_>) -> Option<Reply> {
        let reply = match self.parser.parse(content)? {
            Ok(command) => {
                debug!(?command, channel = %origin.channel, actor = %origin.actor, "command");
                self.execute(command, origin).await
            }
            Err(e) => self.error_reply(&e),
        };
        Some(reply)
    }

    pub async fn execute(&self, command: Command, origin: Origin<'_>) -> Reply {
        match self.run(command, origin).await {
            Ok(reply) => reply,
            Err(e) => self.error_reply(&e),
        }
    }

    /// A reaction was added to one of our prompt messages.
    pub async fn react(&self, prompt: &Prompt, origin: Origin<'_>) -> Reply {
        let result = match prompt.action {
            PromptAction::Kill => self
                .engine
                .on_killed(&prompt.boss, origin.channel, origin.actor)
                .await
                .map(|entry| (entry, true)),
            PromptAction::Reset => self
                .engine
                .reset(&prompt.boss, Some(origin.actor))
                .await
                .map(|entry| (entry, false)),
        };

        match result {
            Ok((entry, killed)) => {
                info!(boss = %entry.name, actor = %origin.actor, action = ?prompt.action, "reaction handled");
                let (now, offset) = self.clock().await;
                let text = if killed {
                    self.render.killed(&entry, now, offset)
                } else {
                    self.render.reset(&entry, now, offset)
                };
                Reply::with_prompt(text, Prompt::reset(&entry.name))
            }
            Err(e) => self.error_reply(&e),
        }
    }

    async fn run(&self, command: Command, origin: Origin<'_>) -> Result<Reply, TimerError> {
        match command {
            Command::Start { name, hours } => {
                let entry = self.engine.start(&name, origin.channel, hours).await?;
                Ok(self.started(&entry).await)
            }
            Command::SetAt {
                hour,
                minute,
                hours,
                name,
            } => {
                let offset = self.prefs.utc_offset().await;
                let spawn_at = next_occurrence(self.engine.now(), hour, minute, offset)
                    .ok_or_else(|| {
                        TimerError::Validation(format!("{hour:02}:{minute:02} is not a valid time."))
                    })?;
                let entry = self
                    .engine
                    .start_at(&name, origin.channel, spawn_at, hours)
                    .await?;
                Ok(self.started(&entry).await)
            }
            Command::Update { name, hours } => {
                let entry = self.engine.update(&name, hours).await?;
                let (now, offset) = self.clock().await;
                Ok(Reply::with_prompt(
                    self.render.updated(&entry, now, offset),
                    Prompt::reset(&entry.name),
                ))
            }
            Command::Reset { name } => {
                let entry = self.engine.reset(&name, Some(origin.actor)).await?;
                let (now, offset) = self.clock().await;
                Ok(Reply::with_prompt(
                    self.render.reset(&entry, now, offset),
                    Prompt::reset(&entry.name),
                ))
            }
            Command::Delete { name } => {
                if !self.engine.cancel(&name).await {
                    return Err(TimerError::not_found(&name));
                }
                Ok(Reply::text(self.render.deleted(&name)))
            }
            Command::List => {
                let entries = self.engine.list().await;
                let (now, offset) = self.clock().await;
                Ok(Reply::text(self.render.list(&entries, now, offset)))
            }
            Command::Forget { name } => {
                let hours = self.engine.durations().forget(&name).await;
                Ok(Reply::text(self.render.forgotten(&name, hours)))
            }
            Command::SetChannel => {
                self.prefs.set_status_channel(origin.channel).await;
                info!(channel = %origin.channel, "status channel set");
                Ok(Reply::text(self.render.channel_set()))
            }
            Command::Timezone { minutes } => {
                let offset = self.prefs.set_offset_minutes(minutes).await?;
                Ok(Reply::text(self.render.timezone_set(offset)))
            }
            Command::Help => Ok(Reply::text(self.render.help())),
        }
    }

    async fn started(&self, entry: &TimerEntry) -> Reply {
        let (now, offset) = self.clock().await;
        Reply::with_prompt(
            self.render.started(entry, now, offset),
            Prompt::reset(&entry.name),
        )
    }

    async fn clock(&self) -> (i64, chrono::FixedOffset) {
        (self.engine.now(), self.prefs.utc_offset().await)
    }

    fn error_reply(&self, error: &TimerError) -> Reply {
        match error {
            TimerError::NotFound { name } => Reply::text(format!(
                "❌ No active timer for **{name}**. Use `{}list` to see active timers.",
                self.parser.prefix()
            )),
            TimerError::Validation(msg) => Reply::text(format!("❌ {msg}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::MonotonicClock, testing::Silent};

    // 2025-01-01T03:00:00Z
    const NOW: i64 = 1_735_700_400_000;

    fn facade() -> Facade {
        let engine = TimerEngine::builder(Arc::new(Silent))
            .clock(MonotonicClock::starting_at(NOW))
            .build();
        Facade::new(
            engine,
            Arc::new(Preferences::in_memory()),
            Arc::new(Render::default()),
            CommandParser::new("!").expect("patterns compile"),
        )
    }

    const HERE: Origin<'static> = Origin {
        channel: "01CHANNEL",
        actor: "alice",
    };

    async fn say(facade: &Facade, text: &str) -> Reply {
        facade.handle_text(text, HERE).await.expect("command")
    }

    #[tokio::test(start_paused = true)]
    async fn start_replies_with_reset_prompt() {
        let facade = facade();
        let reply = say(&facade, "!start Dragon 3").await;
        assert!(reply.text.contains("Timer started for **Dragon**"));
        assert_eq!(reply.prompt, Some(Prompt::reset("Dragon")));

        let entry = facade.engine().get("Dragon").await.expect("active");
        assert_eq!(entry.channel_ref, "01CHANNEL");
        assert_eq!(entry.spawn_at, NOW + 3 * 3_600_000);
    }

    #[tokio::test(start_paused = true)]
    async fn plain_chat_is_ignored() {
        assert!(facade().handle_text("gg everyone", HERE).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_timer_is_reported_not_fatal() {
        let facade = facade();
        let reply = say(&facade, "!reset Dragon").await;
        assert!(reply.text.starts_with("❌ No active timer for **Dragon**"));
        assert_eq!(reply.prompt, None);

        let reply = say(&facade, "!delete Dragon").await;
        assert!(reply.text.starts_with("❌ No active timer"));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_duration_is_rejected() {
        let facade = facade();
        let reply = say(&facade, "!start Dragon -1").await;
        assert!(reply.text.starts_with("❌"));
        assert!(facade.engine().list().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_uses_display_timezone() {
        let facade = facade();
        say(&facade, "!timezone +8").await;
        // 11:00 local now, so 16:30 is five and a half hours away.
        let reply = say(&facade, "!set 16:30 2 Dragon").await;
        assert!(reply.text.contains("16:30 (UTC+8:00)"), "{}", reply.text);

        let entry = facade.engine().get("Dragon").await.expect("active");
        assert_eq!(entry.spawn_at - NOW, 330 * 60_000);
        assert_eq!(entry.cooldown_hours, 2.0);
        assert_eq!(facade.engine().durations().get("Dragon").await, Some(2.0));
    }

    #[tokio::test(start_paused = true)]
    async fn kill_reaction_restarts_with_remembered_cooldown() {
        let facade = facade();
        say(&facade, "!start Dragon 3").await;
        say(&facade, "!delete Dragon").await;

        let reply = facade.react(&Prompt::kill("Dragon"), HERE).await;
        assert!(reply.text.contains("killed by alice"));
        let entry = facade.engine().get("Dragon").await.expect("restarted");
        assert_eq!(entry.cooldown_hours, 3.0);
        assert_eq!(entry.last_actor.as_deref(), Some("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn forget_then_kill_uses_default() {
        let facade = facade();
        say(&facade, "!start Dragon 3").await;
        say(&facade, "!delete Dragon").await;
        let reply = say(&facade, "!forget Dragon").await;
        assert!(reply.text.contains("Forgot the 3h cooldown"));

        facade.react(&Prompt::kill("Dragon"), HERE).await;
        let entry = facade.engine().get("Dragon").await.expect("restarted");
        assert_eq!(entry.cooldown_hours, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn list_is_sorted_by_spawn() {
        let facade = facade();
        say(&facade, "!start Dragon 3").await;
        say(&facade, "!boss 1 Golem").await;
        let reply = say(&facade, "!list").await;
        let golem = reply.text.find("Golem").expect("golem listed");
        let dragon = reply.text.find("Dragon").expect("dragon listed");
        assert!(golem < dragon);
    }
}

//! Periodic "Boss Update" posts to the configured status channel.

use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{
    dispatch::RevoltDispatcher, engine::TimerEngine, preferences::Preferences, render::Render,
};

#[derive(Clone)]
pub struct StatusReporter {
    engine: TimerEngine,
    prefs: Arc<Preferences>,
    render: Arc<Render>,
}

impl StatusReporter {
    pub fn new(engine: TimerEngine, prefs: Arc<Preferences>, render: Arc<Render>) -> Self {
        Self {
            engine,
            prefs,
            render,
        }
    }

    /// Channel and text of the next status post, if one is due: a status
    /// channel is set and at least one timer is running.
    pub async fn compose(&self) -> Option<(String, String)> {
        let channel = self.prefs.status_channel().await?;
        let entries = self.engine.list().await;
        if entries.is_empty() {
            return None;
        }
        let offset = self.prefs.utc_offset().await;
        let text = self.render.status(&entries, self.engine.now(), offset);
        Some((channel, text))
    }

    /// Post every `every`, starting one period from now.
    pub fn spawn(self, dispatcher: RevoltDispatcher, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some((channel, text)) = self.compose().await else {
                    debug!("no status update due");
                    continue;
                };
                if let Err(e) = dispatcher.post(&channel, text, None, None).await {
                    warn!(channel = %channel, error = %e, "failed to post status update");
                }
            }
        })
    }
}

use chrono::{DateTime, Utc};

use crate::{clock::to_datetime, store::PersistedTimer};

/// An active countdown for one boss.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerEntry {
    pub name: String,
    /// Epoch milliseconds.
    pub spawn_at: i64,
    pub cooldown_hours: f64,
    pub channel_ref: String,
    pub last_actor: Option<String>,
}

impl TimerEntry {
    pub fn remaining_ms(&self, now: i64) -> i64 {
        (self.spawn_at - now).max(0)
    }

    pub fn spawn_time(&self) -> DateTime<Utc> {
        to_datetime(self.spawn_at)
    }

    pub fn from_persisted(name: String, saved: PersistedTimer) -> Self {
        Self {
            name,
            spawn_at: saved.spawn_at,
            cooldown_hours: saved.cooldown_hours,
            channel_ref: saved.channel_ref,
            last_actor: saved.last_actor,
        }
    }

    pub fn to_persisted(&self) -> PersistedTimer {
        PersistedTimer {
            spawn_at: self.spawn_at,
            cooldown_hours: self.cooldown_hours,
            channel_ref: self.channel_ref.clone(),
            last_actor: self.last_actor.clone(),
        }
    }
}

//! Chat text for every message the bot posts.

use chrono::FixedOffset;

use crate::{
    clock::to_datetime,
    engine::{
        schedule::{MS_PER_HOUR, MS_PER_MINUTE},
        TimerEntry, WarningThreshold,
    },
};

#[derive(Debug, Clone)]
pub struct Render {
    pub prefix: String,
    pub mention: Option<String>,
    pub kill_emoji: String,
    pub reset_emoji: String,
}

impl Default for Render {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            mention: Some("@everyone".to_string()),
            kill_emoji: "💀".to_string(),
            reset_emoji: "🔄".to_string(),
        }
    }
}

/// `2h 5m 3s`; negative durations render as zero.
pub fn format_remaining(ms: i64) -> String {
    let ms = ms.max(0);
    let hours = ms / MS_PER_HOUR;
    let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;
    let seconds = (ms % MS_PER_MINUTE) / 1000;
    format!("{hours}h {minutes}m {seconds}s")
}

/// `+8:00` style label, or plain `UTC` at zero.
pub fn offset_label(offset: FixedOffset) -> String {
    let total = offset.local_minus_utc() / 60;
    if total == 0 {
        return "UTC".to_string();
    }
    let sign = if total < 0 { '-' } else { '+' };
    let total = total.abs();
    format!("UTC{sign}{}:{:02}", total / 60, total % 60)
}

/// Wall-clock time of `ms` in `offset`, e.g. `2025-10-16 21:30 (UTC+8:00)`.
pub fn format_local(ms: i64, offset: FixedOffset) -> String {
    let local = to_datetime(ms).with_timezone(&offset);
    format!("{} ({})", local.format("%Y-%m-%d %H:%M"), offset_label(offset))
}

/// `3h`, `1.5h`.
pub fn format_hours(hours: f64) -> String {
    format!("{hours}h")
}

impl Render {
    fn with_mention(&self, text: String) -> String {
        match &self.mention {
            Some(mention) if !mention.is_empty() => format!("{mention} {text}"),
            _ => text,
        }
    }

    fn next_spawn(&self, entry: &TimerEntry, now: i64, offset: FixedOffset) -> String {
        format!(
            "Next spawn in **{}** at {}",
            format_remaining(entry.remaining_ms(now)),
            format_local(entry.spawn_at, offset)
        )
    }

    pub fn started(&self, entry: &TimerEntry, now: i64, offset: FixedOffset) -> String {
        format!(
            "⏱️ Timer started for **{}** ({} cooldown).\n{}.\nReact {} to reset it.",
            entry.name,
            format_hours(entry.cooldown_hours),
            self.next_spawn(entry, now, offset),
            self.reset_emoji
        )
    }

    pub fn reset(&self, entry: &TimerEntry, now: i64, offset: FixedOffset) -> String {
        format!(
            "🔄 **{}** reset.\n{}.",
            entry.name,
            self.next_spawn(entry, now, offset)
        )
    }

    pub fn updated(&self, entry: &TimerEntry, now: i64, offset: FixedOffset) -> String {
        format!(
            "✏️ **{}** now uses a {} cooldown.\n{}.",
            entry.name,
            format_hours(entry.cooldown_hours),
            self.next_spawn(entry, now, offset)
        )
    }

    pub fn killed(&self, entry: &TimerEntry, now: i64, offset: FixedOffset) -> String {
        let by = entry
            .last_actor
            .as_deref()
            .map(|actor| format!(" by {actor}"))
            .unwrap_or_default();
        format!(
            "⚔️ **{}** has been killed{by}!\n{} ({} cooldown).\nReact {} to reset it.",
            entry.name,
            self.next_spawn(entry, now, offset),
            format_hours(entry.cooldown_hours),
            self.reset_emoji
        )
    }

    pub fn deleted(&self, name: &str) -> String {
        format!("🗑️ Timer for **{name}** deleted.")
    }

    pub fn forgotten(&self, name: &str, hours: Option<f64>) -> String {
        match hours {
            Some(hours) => format!(
                "🧹 Forgot the {} cooldown for **{name}**.",
                format_hours(hours)
            ),
            None => format!("No remembered cooldown for **{name}**."),
        }
    }

    pub fn channel_set(&self) -> String {
        "✅ Boss status updates will be posted in this channel.".to_string()
    }

    pub fn timezone_set(&self, offset: FixedOffset) -> String {
        format!("🕒 Spawn times will be shown in {}.", offset_label(offset))
    }

    pub fn list(&self, entries: &[TimerEntry], now: i64, offset: FixedOffset) -> String {
        if entries.is_empty() {
            return format!(
                "No active timers. Use `{}start <name> <hours>` to start one.",
                self.prefix
            );
        }

        let mut text = String::from("👑 **Boss Status**\n");
        for (i, entry) in entries.iter().enumerate() {
            text.push_str(&format!(
                "{}. **{}**: {} until spawn, at {}\n",
                i + 1,
                entry.name,
                format_remaining(entry.remaining_ms(now)),
                format_local(entry.spawn_at, offset)
            ));
            if let Some(actor) = &entry.last_actor {
                text.push_str(&format!("   ⚔️ Last killed by: {actor}\n"));
            }
        }
        text
    }

    pub fn status(&self, entries: &[TimerEntry], now: i64, offset: FixedOffset) -> String {
        format!(
            "🔄 **Boss Update**\n{}",
            self.list(entries, now, offset)
                .trim_start_matches("👑 **Boss Status**\n")
        )
    }

    pub fn warning(
        &self,
        entry: &TimerEntry,
        threshold: &WarningThreshold,
        offset: FixedOffset,
    ) -> String {
        self.with_mention(format!(
            "🚨 **{}** will spawn in **{}**! ({})\nReact {} to reset it.",
            entry.name,
            threshold.label(),
            format_local(entry.spawn_at, offset),
            self.reset_emoji
        ))
    }

    pub fn spawn(&self, entry: &TimerEntry, late: bool, offset: FixedOffset) -> String {
        let headline = if late {
            format!(
                "⚔️ **{}** spawned at {} while I was offline!",
                entry.name,
                format_local(entry.spawn_at, offset)
            )
        } else {
            format!("⚔️ **{}** has spawned!", entry.name)
        };
        self.with_mention(format!(
            "{headline}\nReact {} when it has been killed.",
            self.kill_emoji
        ))
    }

    pub fn help(&self) -> String {
        let p = &self.prefix;
        format!(
            "📖 **Boss Timer Commands**\n\
             `{p}start <name> <hours>`: start a timer\n\
             `{p}boss <hours> <name>`: same, hours first\n\
             `{p}set HH:MM [hours] <name>`: spawn at a local time\n\
             `{p}update <hours> <name>`: change a running timer's cooldown\n\
             `{p}reset <name>`: restart a timer with its cooldown\n\
             `{p}delete <name>`: stop a timer\n\
             `{p}list`: show active timers\n\
             `{p}forget <name>`: drop a remembered cooldown\n\
             `{p}setchannel`: post status updates here\n\
             `{p}timezone <+HH[:MM]>`: set the display timezone\n\
             React {} on a spawn message when the boss is killed, {} on a timer message to reset it.",
            self.kill_emoji, self.reset_emoji
        )
    }
}

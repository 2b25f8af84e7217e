//! Which alarms a countdown needs, given its spawn time and "now".

use serde::{Deserialize, Serialize};

use crate::error::TimerError;

pub const MS_PER_MINUTE: i64 = 60_000;
pub const MS_PER_HOUR: i64 = 3_600_000;

/// One year. Anything longer is almost certainly a typo.
pub const MAX_COOLDOWN_HOURS: f64 = 24.0 * 365.0;

/// Lead time before spawn at which a warning goes out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningThreshold {
    pub minutes: u32,
    #[serde(default)]
    pub label: String,
}

impl WarningThreshold {
    pub fn new(minutes: u32, label: impl Into<String>) -> Self {
        Self {
            minutes,
            label: label.into(),
        }
    }

    pub fn minutes(minutes: u32) -> Self {
        Self::new(minutes, "")
    }

    /// Text used in the alert, e.g. "15 minutes".
    pub fn label(&self) -> String {
        if !self.label.trim().is_empty() {
            return self.label.clone();
        }
        match self.minutes {
            1 => "1 minute".to_string(),
            m if m % 60 == 0 && m >= 120 => format!("{} hours", m / 60),
            60 => "1 hour".to_string(),
            m => format!("{m} minutes"),
        }
    }

    pub fn lead_ms(&self) -> i64 {
        i64::from(self.minutes) * MS_PER_MINUTE
    }
}

pub fn default_warnings() -> Vec<WarningThreshold> {
    vec![
        WarningThreshold::new(15, "15 minutes"),
        WarningThreshold::new(5, "5 minutes"),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlarmKind {
    Warning(WarningThreshold),
    Spawn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alarm {
    /// Epoch milliseconds.
    pub at: i64,
    pub kind: AlarmKind,
}

/// Warnings whose trigger time is strictly after `now`, soonest first,
/// followed by the spawn itself.
pub fn plan(spawn_at: i64, now: i64, warnings: &[WarningThreshold]) -> Vec<Alarm> {
    let mut alarms: Vec<Alarm> = warnings
        .iter()
        .filter_map(|w| {
            let at = spawn_at - w.lead_ms();
            (at > now).then(|| Alarm {
                at,
                kind: AlarmKind::Warning(w.clone()),
            })
        })
        .collect();
    alarms.sort_by_key(|a| a.at);
    alarms.push(Alarm {
        at: spawn_at,
        kind: AlarmKind::Spawn,
    });
    alarms
}

/// Validate a cooldown in hours and convert it to milliseconds.
pub fn hours_to_ms(hours: f64) -> Result<i64, TimerError> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(TimerError::Validation(format!(
            "Please provide a valid number of hours (got `{hours}`), e.g. 2, 2.5 or 10."
        )));
    }
    if hours > MAX_COOLDOWN_HOURS {
        return Err(TimerError::Validation(format!(
            "A cooldown can be at most {MAX_COOLDOWN_HOURS} hours."
        )));
    }
    let ms = (hours * MS_PER_HOUR as f64).round() as i64;
    if ms < 1 {
        return Err(TimerError::Validation(
            "That cooldown rounds down to nothing.".to_string(),
        ));
    }
    Ok(ms)
}

//! Per-deployment chat preferences: the channel that receives periodic
//! status posts and the UTC offset used when showing spawn times.

use std::path::Path;

use chrono::{FixedOffset, Offset, Utc};
use tokio::sync::Mutex;

use crate::{
    error::TimerError,
    persist::{Autosave, JsonFile},
};

pub const CHANNEL_FILE: &str = "update-channel.json";
pub const TIMEZONE_FILE: &str = "timezone.json";

/// Real-world offsets span UTC-12:00 to UTC+14:00.
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug)]
pub struct Preferences {
    channel: Mutex<Option<String>>,
    offset_minutes: Mutex<i32>,
    channel_file: Option<Autosave<Option<String>>>,
    offset_file: Option<Autosave<i32>>,
}

impl Preferences {
    pub fn in_memory() -> Self {
        Self {
            channel: Mutex::new(None),
            offset_minutes: Mutex::new(0),
            channel_file: None,
            offset_file: None,
        }
    }

    pub async fn open(dir: impl AsRef<Path>) -> Self {
        let channel = JsonFile::<Option<String>>::new(dir.as_ref().join(CHANNEL_FILE));
        let offset = JsonFile::<i32>::new(dir.as_ref().join(TIMEZONE_FILE));

        let mut offset_minutes = offset.read_or_default().await;
        if validate_offset(offset_minutes).is_err() {
            tracing::warn!(offset_minutes, "saved UTC offset out of range, using UTC");
            offset_minutes = 0;
        }

        Self {
            channel: Mutex::new(channel.read_or_default().await),
            offset_minutes: Mutex::new(offset_minutes),
            channel_file: Some(Autosave::spawn(channel)),
            offset_file: Some(Autosave::spawn(offset)),
        }
    }

    pub async fn status_channel(&self) -> Option<String> {
        self.channel.lock().await.clone()
    }

    pub async fn set_status_channel(&self, channel_id: &str) {
        let mut channel = self.channel.lock().await;
        *channel = Some(channel_id.to_string());
        if let Some(file) = &self.channel_file {
            file.submit(channel.clone());
        }
    }

    /// Forget the status channel if it is `channel_id`. Returns whether it was.
    pub async fn clear_status_channel(&self, channel_id: &str) -> bool {
        let mut channel = self.channel.lock().await;
        if channel.as_deref() != Some(channel_id) {
            return false;
        }
        *channel = None;
        if let Some(file) = &self.channel_file {
            file.submit(None);
        }
        true
    }

    pub async fn offset_minutes(&self) -> i32 {
        *self.offset_minutes.lock().await
    }

    pub async fn utc_offset(&self) -> FixedOffset {
        to_offset(self.offset_minutes().await)
    }

    pub async fn set_offset_minutes(&self, minutes: i32) -> Result<FixedOffset, TimerError> {
        let offset = validate_offset(minutes)?;
        *self.offset_minutes.lock().await = minutes;
        if let Some(file) = &self.offset_file {
            file.submit(minutes);
        }
        Ok(offset)
    }

    pub async fn flush(&self) {
        if let Some(file) = &self.channel_file {
            file.flush().await;
        }
        if let Some(file) = &self.offset_file {
            file.flush().await;
        }
    }
}

fn validate_offset(minutes: i32) -> Result<FixedOffset, TimerError> {
    if !(-12 * 60..=MAX_OFFSET_MINUTES).contains(&minutes) {
        return Err(TimerError::Validation(
            "UTC offsets must be between -12:00 and +14:00.".to_string(),
        ));
    }
    FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| TimerError::Validation(format!("Invalid UTC offset: {minutes} minutes")))
}

fn to_offset(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix())
}

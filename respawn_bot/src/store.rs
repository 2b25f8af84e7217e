//! On-disk form of the active timer set.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::PersistenceError,
    persist::{Autosave, JsonFile},
};

pub const TIMERS_FILE: &str = "active-boss-timers.json";

/// One saved timer. The boss name is the map key in [`TimerMap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTimer {
    /// Epoch milliseconds.
    pub spawn_at: i64,
    pub cooldown_hours: f64,
    pub channel_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_actor: Option<String>,
}

pub type TimerMap = BTreeMap<String, PersistedTimer>;

/// Saves and restores the active timer set.
#[derive(Debug)]
pub struct TimerStore {
    file: JsonFile<TimerMap>,
}

impl TimerStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            file: JsonFile::new(path.as_ref()),
        }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(TIMERS_FILE))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Overwrite the stored set with `entries`.
    pub async fn save(&self, entries: &TimerMap) -> Result<(), PersistenceError> {
        self.file.write(entries).await
    }

    /// Empty when nothing was saved or the file can't be parsed.
    pub async fn load(&self) -> TimerMap {
        self.file.read_or_default().await
    }

    /// Background writer for the engine's mutation path.
    pub fn autosave(&self) -> Autosave<TimerMap> {
        Autosave::spawn(self.file.clone())
    }
}

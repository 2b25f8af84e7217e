//! Last-used cooldown per boss, remembered after its timer is gone so a
//! later "killed" click can restart it without the hours being repeated.

use std::{collections::BTreeMap, path::Path};

use tokio::sync::Mutex;

use crate::persist::{Autosave, JsonFile};

pub const DURATIONS_FILE: &str = "boss-durations.json";

pub type DurationMap = BTreeMap<String, f64>;

#[derive(Debug)]
pub struct DurationStore {
    hours: Mutex<DurationMap>,
    autosave: Option<Autosave<DurationMap>>,
}

impl DurationStore {
    /// Not persisted; for tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            hours: Mutex::new(DurationMap::new()),
            autosave: None,
        }
    }

    /// Load `boss-durations.json` from `dir` and keep it updated.
    pub async fn open(dir: impl AsRef<Path>) -> Self {
        let file = JsonFile::<DurationMap>::new(dir.as_ref().join(DURATIONS_FILE));
        let hours = file.read_or_default().await;
        Self {
            hours: Mutex::new(hours),
            autosave: Some(Autosave::spawn(file)),
        }
    }

    pub async fn get(&self, name: &str) -> Option<f64> {
        self.hours.lock().await.get(name).copied()
    }

    pub async fn set(&self, name: &str, hours: f64) {
        let mut map = self.hours.lock().await;
        if map.get(name) == Some(&hours) {
            return;
        }
        map.insert(name.to_string(), hours);
        self.persist(&map);
    }

    /// Returns the forgotten duration, if any.
    pub async fn forget(&self, name: &str) -> Option<f64> {
        let mut map = self.hours.lock().await;
        let removed = map.remove(name);
        if removed.is_some() {
            self.persist(&map);
        }
        removed
    }

    pub async fn snapshot(&self) -> DurationMap {
        self.hours.lock().await.clone()
    }

    pub async fn flush(&self) {
        if let Some(autosave) = &self.autosave {
            autosave.flush().await;
        }
    }

    fn persist(&self, map: &DurationMap) {
        if let Some(autosave) = &self.autosave {
            autosave.submit(map.clone());
        }
    }
}

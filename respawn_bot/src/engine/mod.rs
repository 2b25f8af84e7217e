//! The timer engine: owns every active countdown and decides when warnings
//! and spawn announcements go out.
//!
//! # Epochs
//!
//! Each installed countdown is stamped with a generation number taken from
//! a counter that only ever increases. The countdown task carries its
//! generation and, under the state lock, checks that the entry it belongs
//! to is still installed with that same generation before doing anything.
//! Replacing or cancelling a timer therefore turns any in-flight callback of
//! the old epoch into a no-op, even if the callback already woke up and is
//! waiting on the lock.
//!
//! ```text
//!   start/reset/killed            spawn fires (generation matches)
//! Absent ───────────────► Active ──────────────────────────────────► Absent
//!                          │  ▲
//!                          └──┘ start/reset/killed (new generation)
//!                          │
//!                          └───────── cancel ──────────────────────► Absent
//! ```

mod entry;
pub mod schedule;

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

pub use entry::TimerEntry;
pub use schedule::{AlarmKind, WarningThreshold};

use crate::{
    clock::{Clock, SystemClock},
    dispatch::AlertDispatcher,
    durations::DurationStore,
    error::TimerError,
    persist::Autosave,
    store::{TimerMap, TimerStore},
};

/// Fallback cooldown for a "killed" boss nobody has timed before.
pub const DEFAULT_COOLDOWN_HOURS: f64 = 2.0;

const MAX_NAME_CHARS: usize = 100;

/// What to do with a saved timer whose spawn time passed while the bot was
/// offline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    /// Announce the spawn once, right away, then forget the timer.
    #[default]
    Announce,
    /// Forget the timer without announcing it.
    Drop,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub warnings: Vec<WarningThreshold>,
    pub default_cooldown_hours: f64,
    pub stale_policy: StalePolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            warnings: schedule::default_warnings(),
            default_cooldown_hours: DEFAULT_COOLDOWN_HOURS,
            stale_policy: StalePolicy::default(),
        }
    }
}

/// Outcome of [`TimerEngine::restore`], by boss name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub announced: Vec<String>,
    pub dropped: Vec<String>,
}

#[derive(Debug)]
struct Slot {
    entry: TimerEntry,
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct State {
    timers: HashMap<String, Slot>,
    next_generation: u64,
    /// Set while a store is attached but its saved timers have not been
    /// restored yet. Writing before then would overwrite them.
    awaiting_restore: bool,
}

impl State {
    fn snapshot(&self) -> TimerMap {
        self.timers
            .iter()
            .map(|(name, slot)| (name.clone(), slot.entry.to_persisted()))
            .collect()
    }

    fn take(&mut self, name: &str) -> Option<TimerEntry> {
        let slot = self.timers.remove(name)?;
        slot.task.abort();
        Some(slot.entry)
    }
}

enum Notice {
    Warning(TimerEntry, WarningThreshold),
    Spawn { entry: TimerEntry, late: bool },
}

struct Inner {
    state: Mutex<State>,
    durations: DurationStore,
    dispatcher: Arc<dyn AlertDispatcher>,
    clock: Arc<dyn Clock>,
    autosave: Option<Autosave<TimerMap>>,
    settings: EngineSettings,
}

impl Inner {
    fn persist(&self, state: &State) {
        let Some(autosave) = &self.autosave else {
            return;
        };
        if state.awaiting_restore {
            debug!("saved timers not restored yet, holding write");
            return;
        }
        autosave.submit(state.snapshot());
    }

    /// Hand a notice to the dispatcher on its own task; delivery is never
    /// awaited by the countdown.
    fn notify(&self, notice: Notice) {
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            let (name, result) = match &notice {
                Notice::Warning(entry, threshold) => (
                    &entry.name,
                    dispatcher.notify_warning(entry, threshold).await,
                ),
                Notice::Spawn { entry, late } => {
                    (&entry.name, dispatcher.notify_spawn(entry, *late).await)
                }
            };
            if let Err(e) = result {
                warn!(boss = %name, error = %e, "failed to deliver notification");
            }
        });
    }

    async fn fire(&self, name: &str, generation: u64, kind: AlarmKind) {
        let mut state = self.state.lock().await;

        let current = state.timers.get(name).map(|slot| slot.generation);
        if current != Some(generation) {
            debug!(boss = %name, generation, ?current, "ignoring superseded callback");
            return;
        }

        match kind {
            AlarmKind::Warning(threshold) => {
                let Some(slot) = state.timers.get(name) else {
                    return;
                };
                let entry = slot.entry.clone();
                drop(state);
                info!(boss = %name, warning = %threshold.label(), "spawn warning");
                self.notify(Notice::Warning(entry, threshold));
            }
            AlarmKind::Spawn => {
                // The running task is this one; dropping its handle detaches it.
                let Some(slot) = state.timers.remove(name) else {
                    return;
                };
                self.persist(&state);
                drop(state);
                info!(boss = %name, "boss spawned");
                self.notify(Notice::Spawn {
                    entry: slot.entry,
                    late: false,
                });
            }
        }
    }
}

async fn run_countdown(
    inner: Weak<Inner>,
    name: String,
    generation: u64,
    alarms: Vec<(Instant, AlarmKind)>,
) {
    for (deadline, kind) in alarms {
        sleep_until(deadline).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.fire(&name, generation, kind).await;
    }
}

fn validate_name(name: &str) -> Result<String, TimerError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TimerError::Validation(
            "Please provide a boss name.".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(TimerError::Validation(format!(
            "Boss names can be at most {MAX_NAME_CHARS} characters."
        )));
    }
    Ok(name.to_string())
}

/// Builder for [`TimerEngine`]; only the dispatcher is required.
pub struct TimerEngineBuilder {
    dispatcher: Arc<dyn AlertDispatcher>,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    durations: Option<DurationStore>,
    autosave: Option<Autosave<TimerMap>>,
}

impl TimerEngineBuilder {
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn durations(mut self, durations: DurationStore) -> Self {
        self.durations = Some(durations);
        self
    }

    /// Persist every mutation to `store` in the background. Nothing is
    /// written until [`TimerEngine::restore`] has run once.
    pub fn store(mut self, store: &TimerStore) -> Self {
        self.autosave = Some(store.autosave());
        self
    }

    pub fn build(self) -> TimerEngine {
        let state = State {
            awaiting_restore: self.autosave.is_some(),
            ..State::default()
        };
        TimerEngine {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                durations: self.durations.unwrap_or_else(DurationStore::in_memory),
                dispatcher: self.dispatcher,
                clock: self.clock,
                autosave: self.autosave,
                settings: self.settings,
            }),
        }
    }
}

/// Cheap to clone; all clones share the same timers.
#[derive(Clone)]
pub struct TimerEngine {
    inner: Arc<Inner>,
}

impl TimerEngine {
    pub fn builder(dispatcher: Arc<dyn AlertDispatcher>) -> TimerEngineBuilder {
        TimerEngineBuilder {
            dispatcher,
            settings: EngineSettings::default(),
            clock: Arc::new(SystemClock),
            durations: None,
            autosave: None,
        }
    }

    pub fn now(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn durations(&self) -> &DurationStore {
        &self.inner.durations
    }

    /// Start (or restart) `name`, spawning `hours` from now.
    pub async fn start(
        &self,
        name: &str,
        channel_ref: &str,
        hours: f64,
    ) -> Result<TimerEntry, TimerError> {
        self.begin(name, channel_ref, hours, None).await
    }

    /// Restart an existing timer with its own cooldown.
    pub async fn reset(&self, name: &str, actor: Option<&str>) -> Result<TimerEntry, TimerError> {
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        let current = state
            .timers
            .get(name)
            .map(|slot| slot.entry.clone())
            .ok_or_else(|| TimerError::not_found(name))?;

        let entry = TimerEntry {
            spawn_at: now + schedule::hours_to_ms(current.cooldown_hours)?,
            last_actor: actor.map(str::to_string).or(current.last_actor),
            ..current
        };
        let entry = self.install(&mut state, entry, now);
        drop(state);

        self.inner
            .durations
            .set(&entry.name, entry.cooldown_hours)
            .await;
        info!(boss = %entry.name, hours = entry.cooldown_hours, "timer reset");
        Ok(entry)
    }

    /// Restart an existing timer with a new cooldown, which is remembered.
    pub async fn update(&self, name: &str, hours: f64) -> Result<TimerEntry, TimerError> {
        let spawn_in = schedule::hours_to_ms(hours)?;
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        let current = state
            .timers
            .get(name)
            .map(|slot| slot.entry.clone())
            .ok_or_else(|| TimerError::not_found(name))?;

        let entry = TimerEntry {
            spawn_at: now + spawn_in,
            cooldown_hours: hours,
            ..current
        };
        let entry = self.install(&mut state, entry, now);
        drop(state);

        self.inner.durations.set(&entry.name, hours).await;
        info!(boss = %entry.name, hours, "timer updated");
        Ok(entry)
    }

    /// A user reported the boss dead: restart it with the remembered
    /// cooldown, or the default when none is known.
    pub async fn on_killed(
        &self,
        name: &str,
        channel_ref: &str,
        actor: &str,
    ) -> Result<TimerEntry, TimerError> {
        let name = validate_name(name)?;
        let hours = self
            .inner
            .durations
            .get(&name)
            .await
            .unwrap_or(self.inner.settings.default_cooldown_hours);
        self.begin(&name, channel_ref, hours, Some(actor)).await
    }

    /// Schedule `name` to spawn at an absolute time. With `cooldown_hours`
    /// the cooldown is remembered for later kills; without it the entry's
    /// cooldown is the whole hours until spawn, rounded up, and nothing is
    /// remembered.
    pub async fn start_at(
        &self,
        name: &str,
        channel_ref: &str,
        spawn_at: i64,
        cooldown_hours: Option<f64>,
    ) -> Result<TimerEntry, TimerError> {
        let name = validate_name(name)?;
        let now = self.now();
        if spawn_at <= now {
            return Err(TimerError::Validation(
                "The spawn time must be in the future.".to_string(),
            ));
        }
        if let Some(hours) = cooldown_hours {
            schedule::hours_to_ms(hours)?;
        }

        let until_spawn_hours = ((spawn_at - now) as f64 / schedule::MS_PER_HOUR as f64).ceil();
        let entry = TimerEntry {
            name,
            spawn_at,
            cooldown_hours: cooldown_hours.unwrap_or(until_spawn_hours),
            channel_ref: channel_ref.to_string(),
            last_actor: None,
        };

        let mut state = self.inner.state.lock().await;
        let entry = self.install(&mut state, entry, now);
        drop(state);

        if let Some(hours) = cooldown_hours {
            self.inner.durations.set(&entry.name, hours).await;
        }
        info!(boss = %entry.name, spawn_at, "timer set to absolute time");
        Ok(entry)
    }

    /// Remove `name` and its pending callbacks. Returns whether it existed.
    pub async fn cancel(&self, name: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(entry) = state.take(name) else {
            return false;
        };
        self.inner.persist(&state);
        info!(boss = %entry.name, "timer cancelled");
        true
    }

    /// Cancel every timer owned by `channel_ref` (e.g. the channel was
    /// deleted). Returns the cancelled names.
    pub async fn cancel_channel(&self, channel_ref: &str) -> Vec<String> {
        let mut state = self.inner.state.lock().await;
        let names: Vec<String> = state
            .timers
            .values()
            .filter(|slot| slot.entry.channel_ref == channel_ref)
            .map(|slot| slot.entry.name.clone())
            .collect();
        for name in &names {
            state.take(name);
        }
        if !names.is_empty() {
            self.inner.persist(&state);
            info!(channel = %channel_ref, count = names.len(), "cancelled timers of channel");
        }
        names
    }

    /// Reinstall saved timers. Future ones keep their original spawn time;
    /// elapsed ones follow [`EngineSettings::stale_policy`] and are removed
    /// from disk before any late announcement is sent. Timers started
    /// before this call are kept alongside the restored ones.
    pub async fn restore(&self, persisted: TimerMap, now: i64) -> RestoreReport {
        let mut report = RestoreReport::default();
        let mut late = Vec::new();
        let mut remembered = Vec::new();

        {
            let mut state = self.inner.state.lock().await;
            for (name, saved) in persisted {
                if state.timers.contains_key(&name) {
                    debug!(boss = %name, "already running, keeping live timer over saved one");
                    continue;
                }
                let entry = TimerEntry::from_persisted(name, saved);
                remembered.push((entry.name.clone(), entry.cooldown_hours));

                if entry.spawn_at > now {
                    report.restored.push(entry.name.clone());
                    self.install(&mut state, entry, now);
                    continue;
                }
                match self.inner.settings.stale_policy {
                    StalePolicy::Announce => {
                        report.announced.push(entry.name.clone());
                        late.push(entry);
                    }
                    StalePolicy::Drop => report.dropped.push(entry.name),
                }
            }
            state.awaiting_restore = false;
            self.inner.persist(&state);
        }

        for (name, hours) in remembered {
            if self.inner.durations.get(&name).await.is_none() && hours > 0.0 {
                self.inner.durations.set(&name, hours).await;
            }
        }

        if !late.is_empty() {
            self.flush().await;
        }
        for entry in late {
            info!(boss = %entry.name, "boss spawned while offline");
            self.inner.notify(Notice::Spawn { entry, late: true });
        }

        info!(
            restored = report.restored.len(),
            announced = report.announced.len(),
            dropped = report.dropped.len(),
            "timers restored"
        );
        report
    }

    /// Load `store` and [`restore`](Self::restore) it against the current time.
    pub async fn restore_from(&self, store: &TimerStore) -> RestoreReport {
        let saved = store.load().await;
        self.restore(saved, self.now()).await
    }

    /// Active timers, soonest spawn first.
    pub async fn list(&self) -> Vec<TimerEntry> {
        let state = self.inner.state.lock().await;
        let mut entries: Vec<TimerEntry> =
            state.timers.values().map(|slot| slot.entry.clone()).collect();
        entries.sort_by(|a, b| a.spawn_at.cmp(&b.spawn_at).then_with(|| a.name.cmp(&b.name)));
        entries
    }

    pub async fn get(&self, name: &str) -> Option<TimerEntry> {
        let state = self.inner.state.lock().await;
        state.timers.get(name).map(|slot| slot.entry.clone())
    }

    /// Wait until the timer and duration files reflect every change so far.
    pub async fn flush(&self) {
        if let Some(autosave) = &self.inner.autosave {
            autosave.flush().await;
        }
        self.inner.durations.flush().await;
    }

    async fn begin(
        &self,
        name: &str,
        channel_ref: &str,
        hours: f64,
        actor: Option<&str>,
    ) -> Result<TimerEntry, TimerError> {
        let name = validate_name(name)?;
        let spawn_in = schedule::hours_to_ms(hours)?;
        let now = self.now();

        let entry = TimerEntry {
            name,
            spawn_at: now + spawn_in,
            cooldown_hours: hours,
            channel_ref: channel_ref.to_string(),
            last_actor: actor.map(str::to_string),
        };

        let mut state = self.inner.state.lock().await;
        let entry = self.install(&mut state, entry, now);
        drop(state);

        self.inner.durations.set(&entry.name, hours).await;
        info!(boss = %entry.name, hours, actor = ?entry.last_actor, "timer started");
        Ok(entry)
    }

    /// Replace whatever is installed under `entry.name` with a fresh epoch.
    /// The old task is aborted and its generation retired before the new
    /// countdown is spawned.
    fn install(&self, state: &mut State, entry: TimerEntry, now: i64) -> TimerEntry {
        if state.take(&entry.name).is_some() {
            debug!(boss = %entry.name, "replacing running timer");
        }

        state.next_generation += 1;
        let generation = state.next_generation;

        let origin = Instant::now();
        let alarms = schedule::plan(entry.spawn_at, now, &self.inner.settings.warnings)
            .into_iter()
            .map(|alarm| {
                let delay = Duration::from_millis((alarm.at - now).max(0) as u64);
                (origin + delay, alarm.kind)
            })
            .collect();

        let task = tokio::spawn(run_countdown(
            Arc::downgrade(&self.inner),
            entry.name.clone(),
            generation,
            alarms,
        ));

        state.timers.insert(
            entry.name.clone(),
            Slot {
                entry: entry.clone(),
                generation,
                task,
            },
        );
        self.inner.persist(state);
        entry
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{clock::MonotonicClock, error::DispatchError};

    const NOW: i64 = 1_735_700_400_000;

    /// Counts every alert it is handed.
    struct Tally(Arc<AtomicUsize>);

    #[async_trait]
    impl AlertDispatcher for Tally {
        async fn notify_warning(
            &self,
            _: &TimerEntry,
            _: &WarningThreshold,
        ) -> Result<(), DispatchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn notify_spawn(&self, _: &TimerEntry, _: bool) -> Result<(), DispatchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn engine() -> (TimerEngine, Arc<AtomicUsize>) {
        let alerts = Arc::new(AtomicUsize::new(0));
        let engine = TimerEngine::builder(Arc::new(Tally(alerts.clone())))
            .clock(MonotonicClock::starting_at(NOW))
            .build();
        (engine, alerts)
    }

    async fn generation_of(engine: &TimerEngine, name: &str) -> Option<u64> {
        let state = engine.inner.state.lock().await;
        state.timers.get(name).map(|slot| slot.generation)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn callback_from_a_replaced_epoch_does_nothing() {
        let (engine, alerts) = engine();
        engine.start("Dragon", "01CHANNEL", 1.0).await.expect("start");
        let old = generation_of(&engine, "Dragon").await.expect("installed");

        engine.start("Dragon", "01CHANNEL", 2.0).await.expect("restart");
        let current = generation_of(&engine, "Dragon").await.expect("installed");
        assert!(current > old);

        // The old task already woke up and reaches the lock after the restart.
        engine.inner.fire("Dragon", old, AlarmKind::Spawn).await;
        engine
            .inner
            .fire("Dragon", old, AlarmKind::Warning(WarningThreshold::minutes(5)))
            .await;
        settle().await;

        assert_eq!(alerts.load(Ordering::SeqCst), 0);
        let entry = engine.get("Dragon").await.expect("still active");
        assert_eq!(entry.cooldown_hours, 2.0);
        assert_eq!(generation_of(&engine, "Dragon").await, Some(current));

        engine.inner.fire("Dragon", current, AlarmKind::Spawn).await;
        settle().await;
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
        assert!(engine.get("Dragon").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn callback_after_cancel_does_nothing() {
        let (engine, alerts) = engine();
        engine.start("Dragon", "01CHANNEL", 1.0).await.expect("start");
        let old = generation_of(&engine, "Dragon").await.expect("installed");
        assert!(engine.cancel("Dragon").await);

        engine.inner.fire("Dragon", old, AlarmKind::Spawn).await;
        settle().await;
        assert_eq!(alerts.load(Ordering::SeqCst), 0);
        assert!(engine.list().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn generations_never_repeat_across_names() {
        let (engine, _) = engine();
        engine.start("Dragon", "01CHANNEL", 1.0).await.expect("start");
        let dragon = generation_of(&engine, "Dragon").await.expect("installed");
        engine.cancel("Dragon").await;
        engine.start("Dragon", "01CHANNEL", 1.0).await.expect("start");
        engine.start("Golem", "01CHANNEL", 1.0).await.expect("start");

        let again = generation_of(&engine, "Dragon").await.expect("installed");
        let golem = generation_of(&engine, "Golem").await.expect("installed");
        assert!(again > dragon);
        assert!(golem > again);
    }
}

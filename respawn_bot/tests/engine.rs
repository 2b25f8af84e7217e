use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use respawn_api::RevoltError;
use respawn_bot::{
    clock::{Clock, MonotonicClock},
    dispatch::AlertDispatcher,
    durations::DurationStore,
    engine::WarningThreshold,
    store::{PersistedTimer, TimerMap, TimerStore},
    DispatchError, EngineSettings, StalePolicy, TimerEngine, TimerEntry, TimerError,
};
use tokio::{sync::Mutex, time::sleep};

// 2025-01-01T03:00:00Z
const NOW: i64 = 1_735_700_400_000;
const MINUTE: i64 = 60_000;
const HOUR: i64 = 60 * MINUTE;

#[derive(Debug, Clone, PartialEq)]
enum Alert {
    Warning { boss: String, label: String, at: i64 },
    Spawn { boss: String, late: bool, at: i64 },
}

/// Records every alert with the engine-clock time it was delivered.
#[derive(Clone)]
struct Recorder {
    clock: MonotonicClock,
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl Recorder {
    fn new(clock: MonotonicClock) -> Self {
        Self {
            clock,
            alerts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().await.clone()
    }

    async fn spawns(&self) -> Vec<Alert> {
        self.alerts()
            .await
            .into_iter()
            .filter(|a| matches!(a, Alert::Spawn { .. }))
            .collect()
    }
}

#[async_trait]
impl AlertDispatcher for Recorder {
    async fn notify_warning(
        &self,
        entry: &TimerEntry,
        threshold: &WarningThreshold,
    ) -> Result<(), DispatchError> {
        self.alerts.lock().await.push(Alert::Warning {
            boss: entry.name.clone(),
            label: threshold.label(),
            at: self.clock.now_ms(),
        });
        Ok(())
    }

    async fn notify_spawn(&self, entry: &TimerEntry, late: bool) -> Result<(), DispatchError> {
        self.alerts.lock().await.push(Alert::Spawn {
            boss: entry.name.clone(),
            late,
            at: self.clock.now_ms(),
        });
        Ok(())
    }
}

/// Every delivery fails.
struct Unreachable;

#[async_trait]
impl AlertDispatcher for Unreachable {
    async fn notify_warning(
        &self,
        _: &TimerEntry,
        _: &WarningThreshold,
    ) -> Result<(), DispatchError> {
        Err(RevoltError::Other("offline".into()).into())
    }

    async fn notify_spawn(&self, _: &TimerEntry, _: bool) -> Result<(), DispatchError> {
        Err(RevoltError::Other("offline".into()).into())
    }
}

fn engine_with(settings: EngineSettings) -> (TimerEngine, Recorder) {
    let clock = MonotonicClock::starting_at(NOW);
    let recorder = Recorder::new(clock);
    let engine = TimerEngine::builder(Arc::new(recorder.clone()))
        .clock(clock)
        .settings(settings)
        .build();
    (engine, recorder)
}

fn engine() -> (TimerEngine, Recorder) {
    engine_with(EngineSettings::default())
}

/// Advance paused time to `at` on the engine clock, plus a second so that
/// callbacks due exactly then have run.
async fn run_until(at: i64, engine: &TimerEngine) {
    let wait = at - engine.now() + 1_000;
    if wait > 0 {
        sleep(Duration::from_millis(wait as u64)).await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn saved(spawn_at: i64, hours: f64) -> PersistedTimer {
    PersistedTimer {
        spawn_at,
        cooldown_hours: hours,
        channel_ref: "01CHANNEL".into(),
        last_actor: None,
    }
}

#[tokio::test(start_paused = true)]
async fn start_then_list_shows_one_entry() {
    let (engine, _) = engine();
    engine.start("Dragon", "01CHANNEL", 3.0).await.expect("start");

    let list = engine.list().await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "Dragon");
    assert_eq!(list[0].spawn_at, NOW + 3 * HOUR);
    assert_eq!(list[0].cooldown_hours, 3.0);
    assert_eq!(list[0].channel_ref, "01CHANNEL");
}

#[tokio::test(start_paused = true)]
async fn restarting_replaces_the_countdown() {
    let (engine, recorder) = engine();
    engine.start("Dragon", "01CHANNEL", 1.0).await.expect("start");
    run_until(NOW + 30 * MINUTE, &engine).await;
    engine.start("Dragon", "01CHANNEL", 1.0).await.expect("restart");

    assert_eq!(engine.list().await.len(), 1);

    // The first countdown would have spawned here.
    run_until(NOW + HOUR, &engine).await;
    assert!(recorder.spawns().await.is_empty());

    let second_spawn = engine.get("Dragon").await.expect("active").spawn_at;
    run_until(second_spawn, &engine).await;
    let spawns = recorder.spawns().await;
    assert_eq!(spawns.len(), 1);
    assert!(matches!(&spawns[0], Alert::Spawn { at, late: false, .. } if *at == second_spawn));
}

#[tokio::test(start_paused = true)]
async fn cancel_missing_is_a_no_op() {
    let (engine, recorder) = engine();
    assert!(!engine.cancel("Dragon").await);
    assert!(engine.list().await.is_empty());
    assert!(recorder.alerts().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_silences_pending_alerts() {
    let (engine, recorder) = engine();
    engine.start("Dragon", "01CHANNEL", 1.0).await.expect("start");
    assert!(engine.cancel("Dragon").await);
    assert!(!engine.cancel("Dragon").await);

    run_until(NOW + 2 * HOUR, &engine).await;
    assert!(recorder.alerts().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn killed_reuses_remembered_cooldown() {
    let (engine, _) = engine();
    engine.start("Dragon", "01CHANNEL", 3.0).await.expect("start");
    engine.cancel("Dragon").await;

    let entry = engine
        .on_killed("Dragon", "01OTHER", "alice")
        .await
        .expect("killed");
    assert_eq!(entry.cooldown_hours, 3.0);
    assert_eq!(entry.spawn_at, NOW + 3 * HOUR);
    assert_eq!(entry.channel_ref, "01OTHER");
    assert_eq!(entry.last_actor.as_deref(), Some("alice"));
}

#[tokio::test(start_paused = true)]
async fn killed_unknown_boss_uses_default_cooldown() {
    let (engine, _) = engine_with(EngineSettings {
        default_cooldown_hours: 4.0,
        ..EngineSettings::default()
    });
    let entry = engine
        .on_killed("Golem", "01CHANNEL", "bob")
        .await
        .expect("killed");
    assert_eq!(entry.cooldown_hours, 4.0);
    assert_eq!(engine.durations().get("Golem").await, Some(4.0));
}

#[tokio::test(start_paused = true)]
async fn warnings_fire_in_order_then_spawn() {
    let (engine, recorder) = engine();
    engine.start("Dragon", "01CHANNEL", 1.0).await.expect("start");

    run_until(NOW + HOUR, &engine).await;
    assert_eq!(
        recorder.alerts().await,
        vec![
            Alert::Warning {
                boss: "Dragon".into(),
                label: "15 minutes".into(),
                at: NOW + 45 * MINUTE
            },
            Alert::Warning {
                boss: "Dragon".into(),
                label: "5 minutes".into(),
                at: NOW + 55 * MINUTE
            },
            Alert::Spawn {
                boss: "Dragon".into(),
                late: false,
                at: NOW + HOUR
            },
        ]
    );
    assert!(engine.list().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn short_cooldown_skips_longer_warnings() {
    let (engine, recorder) = engine();
    // Ten minutes: only the five-minute warning fits.
    engine.start("Imp", "01CHANNEL", 10.0 / 60.0).await.expect("start");

    run_until(NOW + 10 * MINUTE, &engine).await;
    let alerts = recorder.alerts().await;
    assert_eq!(alerts.len(), 2);
    assert!(matches!(&alerts[0], Alert::Warning { label, .. } if label == "5 minutes"));
    assert!(matches!(&alerts[1], Alert::Spawn { .. }));
}

#[tokio::test(start_paused = true)]
async fn reset_missing_is_not_found() {
    let (engine, _) = engine();
    assert_eq!(
        engine.reset("Dragon", Some("alice")).await,
        Err(TimerError::not_found("Dragon"))
    );
    assert_eq!(
        engine.update("Dragon", 2.0).await,
        Err(TimerError::not_found("Dragon"))
    );
}

#[tokio::test(start_paused = true)]
async fn reset_restarts_from_now_with_own_cooldown() {
    let (engine, _) = engine();
    engine.start("Dragon", "01CHANNEL", 2.0).await.expect("start");
    run_until(NOW + HOUR, &engine).await;

    let now = engine.now();
    let entry = engine.reset("Dragon", Some("bob")).await.expect("reset");
    assert_eq!(entry.spawn_at, now + 2 * HOUR);
    assert_eq!(entry.cooldown_hours, 2.0);
    assert_eq!(entry.last_actor.as_deref(), Some("bob"));
}

#[tokio::test(start_paused = true)]
async fn update_changes_and_remembers_cooldown() {
    let (engine, _) = engine();
    engine.start("Dragon", "01CHANNEL", 2.0).await.expect("start");
    let entry = engine.update("Dragon", 5.0).await.expect("update");
    assert_eq!(entry.spawn_at, NOW + 5 * HOUR);
    assert_eq!(entry.channel_ref, "01CHANNEL");
    assert_eq!(engine.durations().get("Dragon").await, Some(5.0));
}

#[tokio::test(start_paused = true)]
async fn invalid_input_is_rejected_before_any_change() {
    let (engine, _) = engine();
    let original = engine.start("Dragon", "01CHANNEL", 3.0).await.expect("start");

    for hours in [0.0, -1.0, f64::NAN, f64::INFINITY, 100_000.0] {
        assert!(matches!(
            engine.start("Dragon", "01CHANNEL", hours).await,
            Err(TimerError::Validation(_))
        ));
    }
    assert!(matches!(
        engine.start("   ", "01CHANNEL", 1.0).await,
        Err(TimerError::Validation(_))
    ));
    assert!(matches!(
        engine.start_at("Golem", "01CHANNEL", NOW - 1, None).await,
        Err(TimerError::Validation(_))
    ));

    assert_eq!(engine.list().await, vec![original]);
    assert_eq!(engine.durations().get("Dragon").await, Some(3.0));
}

#[tokio::test(start_paused = true)]
async fn start_at_without_cooldown_leaves_durations_alone() {
    let (engine, recorder) = engine();
    let entry = engine
        .start_at("Golem", "01CHANNEL", NOW + 90 * MINUTE, None)
        .await
        .expect("start_at");
    assert_eq!(entry.cooldown_hours, 2.0);
    assert_eq!(engine.durations().get("Golem").await, None);

    engine
        .start_at("Dragon", "01CHANNEL", NOW + 30 * MINUTE, Some(6.0))
        .await
        .expect("start_at");
    assert_eq!(engine.durations().get("Dragon").await, Some(6.0));

    run_until(NOW + 30 * MINUTE, &engine).await;
    assert!(matches!(
        recorder.spawns().await.as_slice(),
        [Alert::Spawn { boss, at, .. }] if boss == "Dragon" && *at == NOW + 30 * MINUTE
    ));
}

#[tokio::test(start_paused = true)]
async fn cancel_channel_only_touches_that_channel() {
    let (engine, _) = engine();
    engine.start("Dragon", "01A", 1.0).await.expect("start");
    engine.start("Golem", "01B", 1.0).await.expect("start");
    engine.start("Imp", "01A", 2.0).await.expect("start");

    let mut cancelled = engine.cancel_channel("01A").await;
    cancelled.sort();
    assert_eq!(cancelled, vec!["Dragon".to_string(), "Imp".to_string()]);
    let left: Vec<String> = engine.list().await.into_iter().map(|e| e.name).collect();
    assert_eq!(left, vec!["Golem".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn list_is_ordered_by_spawn_time() {
    let (engine, _) = engine();
    engine.start("Dragon", "01CHANNEL", 3.0).await.expect("start");
    engine.start("Golem", "01CHANNEL", 1.0).await.expect("start");
    engine.start("Imp", "01CHANNEL", 2.0).await.expect("start");

    let names: Vec<String> = engine.list().await.into_iter().map(|e| e.name).collect();
    assert_eq!(names, ["Golem", "Imp", "Dragon"]);
}

#[tokio::test(start_paused = true)]
async fn spawn_removes_entry_even_when_delivery_fails() {
    let engine = TimerEngine::builder(Arc::new(Unreachable))
        .clock(MonotonicClock::starting_at(NOW))
        .build();
    engine.start("Dragon", "01CHANNEL", 0.5).await.expect("start");

    run_until(NOW + 30 * MINUTE, &engine).await;
    assert!(engine.list().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn restored_entry_fires_at_original_spawn() {
    let (engine, recorder) = engine();
    let mut map = TimerMap::new();
    map.insert("Dragon".into(), saved(NOW + 5 * MINUTE, 3.0));

    let report = engine.restore(map, NOW).await;
    assert_eq!(report.restored, vec!["Dragon".to_string()]);
    assert_eq!(engine.durations().get("Dragon").await, Some(3.0));

    run_until(NOW + 5 * MINUTE, &engine).await;
    // Both warnings were already due at restore time and are skipped.
    assert_eq!(
        recorder.alerts().await,
        vec![Alert::Spawn {
            boss: "Dragon".into(),
            late: false,
            at: NOW + 5 * MINUTE
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn restore_keeps_warnings_that_are_still_ahead() {
    let (engine, recorder) = engine();
    let mut map = TimerMap::new();
    map.insert("Dragon".into(), saved(NOW + 10 * MINUTE, 3.0));
    engine.restore(map, NOW).await;

    run_until(NOW + 10 * MINUTE, &engine).await;
    let alerts = recorder.alerts().await;
    assert_eq!(alerts.len(), 2);
    assert!(matches!(&alerts[0], Alert::Warning { label, at, .. }
        if label == "5 minutes" && *at == NOW + 5 * MINUTE));
}

#[tokio::test(start_paused = true)]
async fn stale_entry_is_announced_once_and_removed_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = TimerStore::in_dir(dir.path());
    let mut map = TimerMap::new();
    map.insert("Dragon".into(), saved(NOW - 10 * MINUTE, 3.0));
    map.insert("Golem".into(), saved(NOW + HOUR, 1.0));
    store.save(&map).await.expect("seed");

    let clock = MonotonicClock::starting_at(NOW);
    let recorder = Recorder::new(clock);
    let engine = TimerEngine::builder(Arc::new(recorder.clone()))
        .clock(clock)
        .store(&store)
        .build();

    let report = engine.restore_from(&store).await;
    assert_eq!(report.announced, vec!["Dragon".to_string()]);
    assert_eq!(report.restored, vec!["Golem".to_string()]);

    let on_disk = store.load().await;
    assert!(!on_disk.contains_key("Dragon"));
    assert!(on_disk.contains_key("Golem"));

    run_until(NOW + 30 * MINUTE, &engine).await;
    let dragon: Vec<Alert> = recorder
        .alerts()
        .await
        .into_iter()
        .filter(|a| matches!(a, Alert::Spawn { boss, .. } if boss == "Dragon"))
        .collect();
    assert_eq!(dragon.len(), 1);
    assert!(matches!(&dragon[0], Alert::Spawn { late: true, .. }));
    assert!(engine.get("Dragon").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn stale_entry_is_dropped_silently_under_drop_policy() {
    let (engine, recorder) = engine_with(EngineSettings {
        stale_policy: StalePolicy::Drop,
        ..EngineSettings::default()
    });
    let mut map = TimerMap::new();
    map.insert("Dragon".into(), saved(NOW - MINUTE, 3.0));

    let report = engine.restore(map, NOW).await;
    assert_eq!(report.dropped, vec!["Dragon".to_string()]);
    assert!(report.announced.is_empty());

    run_until(NOW + HOUR, &engine).await;
    assert!(recorder.alerts().await.is_empty());
    assert!(engine.list().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn timers_and_durations_survive_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = TimerStore::in_dir(dir.path());

    {
        let clock = MonotonicClock::starting_at(NOW);
        let recorder = Recorder::new(clock);
        let engine = TimerEngine::builder(Arc::new(recorder))
            .clock(clock)
            .durations(DurationStore::open(dir.path()).await)
            .store(&store)
            .build();
        engine.restore_from(&store).await;
        engine.start("Dragon", "01CHANNEL", 3.0).await.expect("start");
        engine
            .on_killed("Golem", "01CHANNEL", "alice")
            .await
            .expect("killed");
        engine.flush().await;
    }

    let on_disk = store.load().await;
    assert_eq!(on_disk["Dragon"].spawn_at, NOW + 3 * HOUR);
    assert_eq!(on_disk["Golem"].last_actor.as_deref(), Some("alice"));

    let clock = MonotonicClock::starting_at(NOW + HOUR);
    let recorder = Recorder::new(clock);
    let engine = TimerEngine::builder(Arc::new(recorder.clone()))
        .clock(clock)
        .durations(DurationStore::open(dir.path()).await)
        .store(&store)
        .build();
    let report = engine.restore_from(&store).await;
    assert_eq!(report.restored.len(), 2);

    let dragon = engine.get("Dragon").await.expect("restored");
    assert_eq!(dragon.spawn_at, NOW + 3 * HOUR);
    assert_eq!(dragon.cooldown_hours, 3.0);
    assert_eq!(dragon.channel_ref, "01CHANNEL");
    assert_eq!(engine.durations().get("Golem").await, Some(2.0));
}

#[tokio::test(start_paused = true)]
async fn commands_before_restore_keep_saved_timers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = TimerStore::in_dir(dir.path());
    let mut map = TimerMap::new();
    map.insert("Dragon".into(), saved(NOW + HOUR, 3.0));
    store.save(&map).await.expect("seed");

    let clock = MonotonicClock::starting_at(NOW);
    let engine = TimerEngine::builder(Arc::new(Recorder::new(clock)))
        .clock(clock)
        .store(&store)
        .build();

    // A command handled before startup finished restoring.
    engine.start("Golem", "01CHANNEL", 2.0).await.expect("start");
    engine.flush().await;
    assert_eq!(store.load().await, map);

    let report = engine.restore_from(&store).await;
    assert_eq!(report.restored, vec!["Dragon".to_string()]);
    let names: Vec<String> = engine.list().await.into_iter().map(|e| e.name).collect();
    assert_eq!(names, ["Dragon", "Golem"]);

    engine.flush().await;
    let on_disk = store.load().await;
    assert_eq!(on_disk["Dragon"].spawn_at, NOW + HOUR);
    assert_eq!(on_disk["Golem"].spawn_at, NOW + 2 * HOUR);
}

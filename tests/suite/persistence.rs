//! Durable state: JSON snapshots, reopening, and saves that fail.

use std::fs;
use std::sync::Arc;

use chrono::TimeDelta;
use tempfile::tempdir;
use vow_core::{
    Engine, EngineError, EngineSettings, JsonFileStore, ManualClock, PersistenceError, SyncStatus,
};
use vow_types::{ObligationKind, ObligationStatus};

use crate::common::{FlakyStore, engine_with, t0};

#[test]
fn state_survives_reopen_from_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vow").join("state.json");

    let (mut engine, clock) = engine_with(JsonFileStore::new(&path), EngineSettings::default());
    let (failed, _) = engine
        .create_obligation(ObligationKind::Workout, "Deadlift", 5, t0())
        .unwrap();
    let (locked, _) = engine
        .create_obligation(ObligationKind::Meal, "Supper", 1, t0() + TimeDelta::hours(5))
        .unwrap();
    clock.set(t0() + TimeDelta::hours(6));
    engine.tick(t0() + TimeDelta::hours(6)).unwrap();
    engine.log_escape_attempt().unwrap();
    assert!(engine.sync_status().is_synced());
    let before = engine.state().clone();
    drop(engine);

    let (reopened, _) = engine_with(JsonFileStore::new(&path), EngineSettings::default());
    assert_eq!(reopened.state(), &before);
    assert_eq!(
        reopened.obligation(failed).unwrap().status(),
        ObligationStatus::Failed
    );
    let lock = reopened.active_lock().unwrap();
    assert_eq!(lock.obligation_id(), locked);
    assert_eq!(lock.escape_attempts(), 1);
    assert_eq!(reopened.ledger().failure_count(), 1);
    assert_eq!(reopened.events().last_seq(), before.events.last_seq());
}

#[test]
fn snapshot_uses_wire_names() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    let (mut engine, _) = engine_with(JsonFileStore::new(&path), EngineSettings::default());
    engine
        .create_obligation(ObligationKind::Habit, "Floss", 1, t0())
        .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["version"], 1);
    let first = &json["events"][0];
    assert_eq!(first["seq"], 1);
    assert_eq!(first["event"]["category"], "lifecycle");
    assert_eq!(first["event"]["event"]["type"], "OBLIGATION_CREATED");
    assert_eq!(first["event"]["event"]["kind"], "HABIT");
}

#[test]
fn corrupt_snapshot_refuses_to_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    fs::write(&path, "{ not json").unwrap();

    let result = Engine::open(
        JsonFileStore::new(&path),
        EngineSettings::default(),
        Arc::new(ManualClock::new(t0())),
    );
    assert!(matches!(
        result,
        Err(EngineError::Persistence(PersistenceError::Deserialize(_)))
    ));
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
}

#[test]
fn failed_saves_keep_memory_and_retry_on_next_mutation() {
    let store = FlakyStore {
        failing: true,
        ..FlakyStore::default()
    };
    let (mut engine, _) = engine_with(store, EngineSettings::default());

    let (id, _) = engine
        .create_obligation(ObligationKind::Workout, "Lunges", 30, t0())
        .unwrap();
    engine.tick(t0() + TimeDelta::hours(5)).unwrap();
    assert_eq!(
        engine.obligation(id).unwrap().status(),
        ObligationStatus::Failed
    );
    match engine.sync_status() {
        SyncStatus::Unsynced {
            since,
            attempts,
            last_error,
        } => {
            assert_eq!(*since, t0());
            assert_eq!(*attempts, 2);
            assert!(last_error.contains("disk full"));
        }
        SyncStatus::Synced => panic!("expected unsynced"),
    }
    assert!(engine.store().saved.is_none());

    engine.store_mut().failing = false;
    // A tick with nothing new still retries the pending save.
    assert!(engine.tick(t0() + TimeDelta::hours(5)).unwrap().is_empty());
    assert!(engine.sync_status().is_synced());
    let saved = engine.store().saved.as_ref().unwrap();
    assert_eq!(saved.ledger.failure_count(), 1);
    assert_eq!(saved, engine.state());

    let attempts = engine.store().attempts;
    engine.retry_sync().unwrap();
    assert_eq!(engine.store().attempts, attempts);
}

#[test]
fn explicit_retry_clears_unsynced() {
    let (mut engine, _) = engine_with(
        FlakyStore {
            failing: true,
            ..FlakyStore::default()
        },
        EngineSettings::default(),
    );
    engine
        .create_obligation(ObligationKind::Custom, "Taxes", 1, t0() + TimeDelta::hours(30))
        .unwrap();
    assert!(engine.retry_sync().is_err());
    assert!(matches!(
        engine.sync_status(),
        SyncStatus::Unsynced { attempts: 2, .. }
    ));

    engine.store_mut().failing = false;
    engine.retry_sync().unwrap();
    assert!(engine.sync_status().is_synced());
    assert_eq!(engine.store().saved.as_ref().unwrap().obligations.len(), 1);
}

//! Obligation lifecycle and lock behavior through the public engine API.

use std::collections::HashMap;

use chrono::TimeDelta;
use vow_core::{EngineError, EngineSettings, InvalidStateError, MemoryStore};
use vow_types::{
    LockOutcome, Obligation, ObligationId, ObligationKind, ObligationStatus, PressureEventKind,
    PressureLevel,
};

use crate::common::{
    debt_amounts, engine_with, memory_engine, pressure_kinds, status_changes, t0,
};

#[test]
fn push_ups_lock_on_next_tick_and_release_on_execution() {
    let (mut engine, _) = memory_engine();
    let (id, _) = engine
        .create_obligation(ObligationKind::Workout, "PUSH-UPS", 100, t0())
        .unwrap();
    assert_eq!(
        engine.obligation(id).unwrap().status(),
        ObligationStatus::Created
    );
    assert!(!engine.is_locked());

    let events = engine.tick(t0()).unwrap();
    assert_eq!(status_changes(&events), vec![(id, ObligationStatus::Bound)]);
    assert_eq!(engine.get_locked_obligation().map(Obligation::id), Some(id));
    assert_eq!(engine.pressure().unwrap().level(), PressureLevel::P0);

    let events = engine.log_execution(id, 100).unwrap();
    assert_eq!(status_changes(&events), vec![(id, ObligationStatus::Executed)]);
    assert!(!engine.is_locked());
    assert!(engine.get_pending_obligations().is_empty());
    assert_eq!(
        engine.obligation(id).unwrap().status(),
        ObligationStatus::Executed
    );
    assert_eq!(engine.lock_history().len(), 1);
    assert_eq!(engine.lock_history()[0].outcome, LockOutcome::Executed);
}

#[test]
fn binding_obligation_cannot_be_deleted() {
    let (mut engine, _) = memory_engine();
    let (soon, _) = engine
        .create_obligation(ObligationKind::Meal, "Dinner", 1, t0() + TimeDelta::hours(12))
        .unwrap();
    let (later, _) = engine
        .create_obligation(ObligationKind::Habit, "Journal", 1, t0() + TimeDelta::hours(48))
        .unwrap();

    let err = engine.delete_obligation(soon).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState(InvalidStateError::NotDeletable {
            status: ObligationStatus::Binding,
            ..
        })
    ));
    assert_eq!(engine.get_pending_obligations().len(), 2);

    engine.delete_obligation(later).unwrap();
    let pending: Vec<ObligationId> = engine
        .get_pending_obligations()
        .into_iter()
        .map(Obligation::id)
        .collect();
    assert_eq!(pending, vec![soon]);
    assert_eq!(engine.archived().len(), 1);
    assert!(matches!(
        engine.delete_obligation(later),
        Err(EngineError::NotFound(_))
    ));
}

#[test]
fn single_late_tick_replays_missed_transitions() {
    let settings = EngineSettings::from_minutes(60).unwrap();
    let (mut engine, _) = engine_with(MemoryStore::new(), settings);
    let (id, _) = engine
        .create_obligation(ObligationKind::Workout, "Run", 5, t0())
        .unwrap();

    let events = engine.tick(t0() + TimeDelta::hours(2)).unwrap();
    assert_eq!(
        status_changes(&events),
        vec![(id, ObligationStatus::Bound), (id, ObligationStatus::Failed)]
    );
    assert!(!engine.is_locked());
    assert_eq!(
        engine.obligation(id).unwrap().status(),
        ObligationStatus::Failed
    );

    let record = &engine.lock_history()[0];
    assert_eq!(record.outcome, LockOutcome::Failed);
    assert_eq!(record.final_level, PressureLevel::P4);
    assert_eq!(record.locked_at, t0());
    assert_eq!(engine.ledger().failure_count(), 1);
    assert!(pressure_kinds(&events).contains(&PressureEventKind::FailureUnderPressure));
}

#[test]
fn single_late_tick_charges_debt_from_prior_failures() {
    let settings = EngineSettings::from_minutes(60).unwrap();
    let (mut engine, clock) = engine_with(MemoryStore::new(), settings);
    for hours in [0, 2] {
        engine
            .create_obligation(ObligationKind::Workout, "Run", 5, t0() + TimeDelta::hours(hours))
            .unwrap();
    }
    engine.tick(t0() + TimeDelta::hours(4)).unwrap();
    assert_eq!(engine.ledger().failure_count(), 2);
    let debt_before = engine.ledger().debt_units();

    clock.set(t0() + TimeDelta::hours(4));
    let (id, _) = engine
        .create_obligation(ObligationKind::Workout, "Run", 5, t0() + TimeDelta::hours(5))
        .unwrap();
    let events = engine.tick(t0() + TimeDelta::hours(7)).unwrap();
    assert_eq!(
        status_changes(&events),
        vec![(id, ObligationStatus::Bound), (id, ObligationStatus::Failed)]
    );
    assert_eq!(debt_amounts(&events), vec![3.0]);
    assert_eq!(
        engine.lock_history().last().unwrap().final_level,
        PressureLevel::P4
    );
    assert_eq!(engine.ledger().failure_count(), 3);
    assert!((engine.ledger().debt_units() - debt_before - 3.0).abs() < f64::EPSILON);
}

#[test]
fn lock_stays_exclusive_and_statuses_never_regress() {
    let (mut engine, clock) = memory_engine();
    let (first, _) = engine
        .create_obligation(ObligationKind::Workout, "Squats", 50, t0())
        .unwrap();
    let (second, _) = engine
        .create_obligation(ObligationKind::Meal, "Breakfast", 1, t0() + TimeDelta::minutes(10))
        .unwrap();
    let (third, _) = engine
        .create_obligation(ObligationKind::Habit, "Read", 30, t0() + TimeDelta::minutes(20))
        .unwrap();

    let mut seen: HashMap<ObligationId, u8> = HashMap::new();
    for step in 0..=32 {
        let now = t0() + TimeDelta::minutes(15 * step);
        clock.set(now);
        engine.tick(now).unwrap();
        if step == 4 {
            engine.log_execution(second, 1).unwrap();
        }

        if let Some(holder) = engine.get_locked_obligation() {
            assert_eq!(holder.status(), ObligationStatus::Bound);
            assert_ne!(engine.get_next_obligation().map(Obligation::id), Some(holder.id()));
        }
        for obligation in engine.obligations() {
            let rank = obligation.status().rank();
            let previous = seen.insert(obligation.id(), rank).unwrap_or(0);
            assert!(rank >= previous, "{} regressed", obligation.id());
        }
    }

    let status = |id| engine.obligation(id).unwrap().status();
    assert_eq!(status(first), ObligationStatus::Failed);
    assert_eq!(status(second), ObligationStatus::Executed);
    assert_eq!(status(third), ObligationStatus::Failed);
    assert_eq!(engine.lock_history().len(), 2);
    assert_eq!(engine.ledger().failure_count(), 2);
}

#[test]
fn clock_moving_backwards_changes_nothing() {
    let (mut engine, _) = memory_engine();
    engine
        .create_obligation(ObligationKind::Workout, "Plank", 3, t0())
        .unwrap();
    engine.tick(t0() + TimeDelta::hours(3)).unwrap();
    assert_eq!(engine.pressure().unwrap().level(), PressureLevel::P3);
    let snapshot = engine.state().clone();

    let events = engine.tick(t0() + TimeDelta::hours(1)).unwrap();
    assert!(events.is_empty());
    assert_eq!(engine.state(), &snapshot);
    assert_eq!(engine.last_tick(), Some(t0() + TimeDelta::hours(3)));
}

#[test]
fn execution_after_failure_is_rejected() {
    let (mut engine, clock) = memory_engine();
    let (id, _) = engine
        .create_obligation(ObligationKind::Custom, "Call home", 1, t0())
        .unwrap();
    clock.set(t0() + TimeDelta::hours(6));
    engine.tick(t0() + TimeDelta::hours(6)).unwrap();

    let err = engine.log_execution(id, 1).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState(InvalidStateError::Terminal { .. })
    ));
    assert_eq!(engine.obligation(id).unwrap().units_completed(), 0);
}

#[test]
fn over_execution_is_recorded_in_full() {
    let (mut engine, _) = memory_engine();
    let (id, _) = engine
        .create_obligation(ObligationKind::Workout, "Burpees", 20, t0())
        .unwrap();
    engine.tick(t0()).unwrap();

    engine.log_execution(id, 15).unwrap();
    engine.log_execution(id, 15).unwrap();
    let obligation = engine.obligation(id).unwrap();
    assert_eq!(obligation.status(), ObligationStatus::Executed);
    assert_eq!(obligation.units_completed(), 30);
    assert_eq!(obligation.units_remaining(), 0);
}

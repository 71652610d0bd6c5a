//! Debt accrual and chronic-delay compression across whole lifecycles.

use chrono::TimeDelta;
use vow_core::{EngineSettings, MemoryStore};
use vow_types::{EngineEvent, LifecycleEvent, Obligation, ObligationKind, PressureLevel};

use crate::common::{debt_amounts, engine_with, memory_engine, t0};

fn chronic_activations(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|event| {
            matches!(
                event.as_lifecycle(),
                Some(LifecycleEvent::ChronicDelayActivated { .. })
            )
        })
        .count()
}

#[test]
fn failure_cost_grows_with_count_and_pressure() {
    let (mut engine, _) = memory_engine();
    // Fails holding the lock at P4.
    engine
        .create_obligation(ObligationKind::Workout, "Squats", 40, t0())
        .unwrap();
    // Inherits the lock one minute before its own deadline, fails at P0.
    engine
        .create_obligation(ObligationKind::Meal, "Lunch", 1, t0() + TimeDelta::minutes(1))
        .unwrap();
    // Fails holding the lock at P4 after two earlier failures.
    engine
        .create_obligation(ObligationKind::Habit, "Read", 20, t0() + TimeDelta::hours(5))
        .unwrap();

    let events = engine.tick(t0() + TimeDelta::hours(10)).unwrap();
    assert_eq!(debt_amounts(&events), vec![0.0, 1.0, 3.0]);

    let levels: Vec<PressureLevel> = engine
        .lock_history()
        .iter()
        .map(|record| record.final_level)
        .collect();
    assert_eq!(
        levels,
        vec![PressureLevel::P4, PressureLevel::P0, PressureLevel::P4]
    );
    let ledger = engine.ledger();
    assert!((ledger.debt_units() - 4.0).abs() < f64::EPSILON);
    assert_eq!(ledger.failure_count(), 3);
    assert!(!ledger.chronic_delay());
}

#[test]
fn three_high_pressure_failures_compress_new_windows() {
    let (mut engine, clock) = memory_engine();
    for hours in [0, 5, 10] {
        engine
            .create_obligation(
                ObligationKind::Workout,
                "Intervals",
                8,
                t0() + TimeDelta::hours(hours),
            )
            .unwrap();
    }

    let events = engine.tick(t0() + TimeDelta::hours(15)).unwrap();
    assert_eq!(debt_amounts(&events), vec![0.0, 1.5, 3.0]);
    assert_eq!(chronic_activations(&events), 1);
    let ledger = engine.ledger();
    assert!(ledger.chronic_delay());
    assert_eq!(ledger.chronic_activation_count(), 1);
    assert!((ledger.compression_factor() - 0.9).abs() < f64::EPSILON);

    clock.set(t0() + TimeDelta::hours(15));
    let (id, _) = engine
        .create_obligation(
            ObligationKind::Meal,
            "Dinner",
            1,
            t0() + TimeDelta::hours(16),
        )
        .unwrap();
    assert_eq!(
        engine.obligation(id).unwrap().window(),
        TimeDelta::minutes(216)
    );
}

#[test]
fn compression_stops_at_two_hour_floor() {
    let settings = EngineSettings::from_minutes(126).unwrap();
    let (mut engine, clock) = engine_with(MemoryStore::new(), settings);
    for hours in [0, 3, 6] {
        engine
            .create_obligation(
                ObligationKind::Workout,
                "Sprints",
                10,
                t0() + TimeDelta::hours(hours),
            )
            .unwrap();
    }
    engine.tick(t0() + TimeDelta::hours(9)).unwrap();
    assert!(engine.ledger().chronic_delay());

    clock.set(t0() + TimeDelta::hours(9));
    let (id, _) = engine
        .create_obligation(
            ObligationKind::Workout,
            "Sprints",
            10,
            t0() + TimeDelta::hours(10),
        )
        .unwrap();
    assert_eq!(engine.obligation(id).unwrap().window(), TimeDelta::hours(2));
}

#[test]
fn execution_breaks_a_high_pressure_run() {
    let (mut engine, clock) = memory_engine();
    for hours in [0, 5] {
        engine
            .create_obligation(
                ObligationKind::Workout,
                "Rowing",
                10,
                t0() + TimeDelta::hours(hours),
            )
            .unwrap();
    }
    let (kept, _) = engine
        .create_obligation(ObligationKind::Habit, "Meditate", 1, t0() + TimeDelta::hours(10))
        .unwrap();
    engine
        .create_obligation(ObligationKind::Workout, "Rowing", 10, t0() + TimeDelta::hours(15))
        .unwrap();

    engine.tick(t0() + TimeDelta::hours(10)).unwrap();
    assert_eq!(engine.ledger().consecutive_high_pressure_failures(), 2);
    assert_eq!(engine.get_locked_obligation().map(Obligation::id), Some(kept));

    clock.set(t0() + TimeDelta::hours(10));
    engine.log_execution(kept, 1).unwrap();
    assert_eq!(engine.ledger().consecutive_high_pressure_failures(), 0);

    engine.tick(t0() + TimeDelta::hours(20)).unwrap();
    let ledger = engine.ledger();
    assert!(!ledger.chronic_delay());
    assert_eq!(ledger.consecutive_high_pressure_failures(), 1);
    assert!((ledger.debt_units() - 4.5).abs() < f64::EPSILON);
}

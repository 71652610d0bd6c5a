//! Single-flight ticks through [`TickDriver`] across threads.

use std::sync::Arc;
use std::thread;

use chrono::TimeDelta;
use vow_core::{EngineError, EngineSettings, TickDriver};
use vow_types::ObligationKind;

use crate::common::{GateStore, engine_with, t0};

#[test]
fn tick_during_slow_save_is_refused() {
    let (store, entered, release) = GateStore::new();
    let (mut engine, _) = engine_with(store, EngineSettings::default());
    engine
        .create_obligation(ObligationKind::Workout, "PUSH-UPS", 100, t0())
        .unwrap();
    engine.store_mut().armed = true;

    let driver = Arc::new(TickDriver::new(engine));
    let background = {
        let driver = Arc::clone(&driver);
        thread::spawn(move || driver.tick(t0()))
    };

    entered.recv().unwrap();
    assert!(driver.is_ticking());
    assert!(matches!(
        driver.tick(t0() + TimeDelta::seconds(1)),
        Err(EngineError::Concurrency)
    ));

    release.send(()).unwrap();
    let events = background.join().unwrap().unwrap();
    assert!(!events.is_empty());
    assert!(!driver.is_ticking());
    assert!(driver.with_engine(|engine| engine.is_locked()));
}

#[test]
fn sequential_ticks_all_run() {
    let (store, _entered, _release) = GateStore::new();
    let (engine, _) = engine_with(store, EngineSettings::default());
    let driver = TickDriver::new(engine);

    for minutes in 0..5 {
        driver.tick(t0() + TimeDelta::minutes(minutes)).unwrap();
    }
    assert_eq!(
        driver.into_inner().last_tick(),
        Some(t0() + TimeDelta::minutes(4))
    );
}

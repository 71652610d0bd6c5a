//! Shared test utilities and fixtures
//!
//! Engines driven by a [`ManualClock`], plus stores that misbehave on demand.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use chrono::{DateTime, TimeZone, Utc};
use vow_core::{
    Engine, EngineSettings, EngineState, ManualClock, MemoryStore, PersistenceError, StateStore,
};
use vow_types::{EngineEvent, LifecycleEvent, ObligationId, ObligationStatus, PressureEventKind};

/// Monday 2026-03-02 06:00 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap()
}

pub fn engine_with<S: StateStore>(
    store: S,
    settings: EngineSettings,
) -> (Engine<S>, ManualClock) {
    let clock = ManualClock::new(t0());
    let engine = Engine::open(store, settings, Arc::new(clock.clone())).unwrap();
    (engine, clock)
}

pub fn memory_engine() -> (Engine<MemoryStore>, ManualClock) {
    engine_with(MemoryStore::new(), EngineSettings::default())
}

pub fn status_changes(events: &[EngineEvent]) -> Vec<(ObligationId, ObligationStatus)> {
    events
        .iter()
        .filter_map(|event| match event.as_lifecycle()? {
            LifecycleEvent::StatusChanged { id, to, .. } => Some((*id, *to)),
            _ => None,
        })
        .collect()
}

pub fn pressure_kinds(events: &[EngineEvent]) -> Vec<PressureEventKind> {
    events
        .iter()
        .filter_map(EngineEvent::as_pressure)
        .map(|event| event.kind)
        .collect()
}

pub fn debt_amounts(events: &[EngineEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match event.as_lifecycle()? {
            LifecycleEvent::DebtAccrued { amount, .. } => Some(*amount),
            _ => None,
        })
        .collect()
}

/// In-memory store whose saves can be switched to fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub saved: Option<EngineState>,
    pub failing: bool,
    pub attempts: u32,
}

impl StateStore for FlakyStore {
    fn load(&mut self) -> Result<Option<EngineState>, PersistenceError> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, state: &EngineState) -> Result<(), PersistenceError> {
        self.attempts += 1;
        if self.failing {
            return Err(PersistenceError::Unavailable("disk full".to_string()));
        }
        self.saved = Some(state.clone());
        Ok(())
    }
}

/// Store whose saves, once armed, park until the test lets them through.
pub struct GateStore {
    pub armed: bool,
    entered: Sender<()>,
    release: Receiver<()>,
}

impl GateStore {
    /// Returns the store, a receiver that fires when a save parks, and the
    /// sender that lets one parked save finish.
    pub fn new() -> (Self, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Self {
            armed: false,
            entered: entered_tx,
            release: release_rx,
        };
        (store, entered_rx, release_tx)
    }
}

impl StateStore for GateStore {
    fn load(&mut self) -> Result<Option<EngineState>, PersistenceError> {
        Ok(None)
    }

    fn save(&mut self, _state: &EngineState) -> Result<(), PersistenceError> {
        if self.armed {
            let _ = self.entered.send(());
            let _ = self.release.recv();
        }
        Ok(())
    }
}

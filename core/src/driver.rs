//! Heartbeat-facing wrapper that serializes access to an [`Engine`].
//!
//! Ticks are single-flight: a tick that arrives while another is still
//! running is refused with [`EngineError::Concurrency`] instead of queueing
//! behind it. Other operations wait for the engine mutex.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;
use vow_types::EngineEvent;

use crate::engine::Engine;
use crate::errors::EngineError;
use crate::persistence::StateStore;

pub struct TickDriver<S> {
    engine: Mutex<Engine<S>>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when dropped.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Result<Self, EngineError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EngineError::Concurrency)?;
        Ok(Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<S: StateStore> TickDriver<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self {
            engine: Mutex::new(engine),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn tick(&self, now: DateTime<Utc>) -> Result<Vec<EngineEvent>, EngineError> {
        let _flight = FlightGuard::enter(&self.in_flight).inspect_err(|_| {
            debug!(%now, "Tick refused: previous tick still running");
        })?;
        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        engine.tick(now)
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with_engine<T>(&self, f: impl FnOnce(&mut Engine<S>) -> T) -> T {
        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut engine)
    }

    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn into_inner(self) -> Engine<S> {
        self.engine
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

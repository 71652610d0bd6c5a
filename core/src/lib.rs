//! Obligation lifecycle, lock, pressure and debt engine for Vow.
//!
//! [`Engine`] is the single entry point. It owns an [`ObligationStore`], the
//! [`LockManager`] with its [`PressureState`], the [`DebtLedger`] and the
//! permanent [`EventLog`], and saves all of it through a [`StateStore`].
//! [`TickDriver`] wraps an engine for a heartbeat that may overlap itself.

mod clock;
pub mod debt;
mod driver;
mod engine;
mod errors;
mod event_log;
mod lock;
pub mod persistence;
pub mod pressure;
mod settings;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use debt::{DebtLedger, FailurePenalty};
pub use driver::TickDriver;
pub use engine::Engine;
pub use errors::{EngineError, InvalidStateError, PersistenceError, ValidationError};
pub use event_log::{EventLog, LoggedEvent};
pub use lock::{Lock, LockManager, LockRecord};
pub use persistence::{EngineState, JsonFileStore, MemoryStore, StateStore, SyncStatus};
pub use pressure::{Cadence, Framing, LevelProfile, PressureState, PromptTable, PromptTableError};
pub use settings::{DEFAULT_STANDARD_WINDOW, EngineSettings};
pub use store::ObligationStore;

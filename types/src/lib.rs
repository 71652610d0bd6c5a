//! Core domain types for Vow.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod event;
mod ids;
mod obligation;
mod pressure;
mod proofs;
pub mod time;

pub use event::{
    EngineEvent, LifecycleEvent, LockOutcome, PressureEvent, PressureEventKind,
};
pub use ids::{LockId, ObligationId};
pub use obligation::{
    BINDING_LEAD, ExecutionProgress, KindParseError, Obligation, ObligationKind,
    ObligationStatus, StatusChange, TerminalStatusError, checked_deadline, resolve_status,
};
pub use pressure::{PressureLevel, elapsed_percent};
pub use proofs::{EmptyStringError, NonEmptyString, PositiveUnits, ZeroUnitsError};

//! Events emitted by the engine for the presentation/notification layer.
//!
//! Every mutating engine call returns the events it produced, in order. The
//! same events are appended to the permanent event log.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{LockId, ObligationId};
use crate::obligation::{ObligationKind, ObligationStatus, StatusChange};
use crate::pressure::PressureLevel;

/// How a lock ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockOutcome {
    Executed,
    Failed,
}

impl LockOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PressureEventKind {
    PressureInitialized,
    PressureEscalated,
    PromptDelivered,
    ExecutionUnderPressure,
    FailureUnderPressure,
    PressureResolved,
}

impl PressureEventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PressureInitialized => "PRESSURE_INITIALIZED",
            Self::PressureEscalated => "PRESSURE_ESCALATED",
            Self::PromptDelivered => "PROMPT_DELIVERED",
            Self::ExecutionUnderPressure => "EXECUTION_UNDER_PRESSURE",
            Self::FailureUnderPressure => "FAILURE_UNDER_PRESSURE",
            Self::PressureResolved => "PRESSURE_RESOLVED",
        }
    }
}

impl fmt::Display for PressureEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureEvent {
    pub kind: PressureEventKind,
    pub lock_id: LockId,
    pub pressure_level: PressureLevel,
    pub timestamp: DateTime<Utc>,
    pub elapsed_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEvent {
    ObligationCreated {
        id: ObligationId,
        kind: ObligationKind,
        name: String,
        units_required: u32,
        scheduled_at: DateTime<Utc>,
        window_ms: i64,
        at: DateTime<Utc>,
    },
    StatusChanged {
        id: ObligationId,
        from: ObligationStatus,
        to: ObligationStatus,
        at: DateTime<Utc>,
    },
    ExecutionLogged {
        id: ObligationId,
        units: u32,
        units_completed: u32,
        units_required: u32,
        at: DateTime<Utc>,
    },
    ObligationDeleted {
        id: ObligationId,
        at: DateTime<Utc>,
    },
    LockAcquired {
        lock_id: LockId,
        obligation_id: ObligationId,
        at: DateTime<Utc>,
    },
    LockReleased {
        lock_id: LockId,
        obligation_id: ObligationId,
        outcome: LockOutcome,
        final_level: PressureLevel,
        at: DateTime<Utc>,
    },
    EscapeAttempted {
        lock_id: LockId,
        attempts: u32,
        at: DateTime<Utc>,
    },
    DebtAccrued {
        obligation_id: ObligationId,
        pressure_level: PressureLevel,
        base: f64,
        multiplier: f64,
        amount: f64,
        total: f64,
        failure_count: u32,
        at: DateTime<Utc>,
    },
    ChronicDelayActivated {
        activation_count: u32,
        compression_factor: f64,
        at: DateTime<Utc>,
    },
}

impl From<StatusChange> for LifecycleEvent {
    fn from(change: StatusChange) -> Self {
        Self::StatusChanged {
            id: change.id,
            from: change.from,
            to: change.to,
            at: change.at,
        }
    }
}

impl LifecycleEvent {
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ObligationCreated { at, .. }
            | Self::StatusChanged { at, .. }
            | Self::ExecutionLogged { at, .. }
            | Self::ObligationDeleted { at, .. }
            | Self::LockAcquired { at, .. }
            | Self::LockReleased { at, .. }
            | Self::EscapeAttempted { at, .. }
            | Self::DebtAccrued { at, .. }
            | Self::ChronicDelayActivated { at, .. } => *at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Lifecycle(LifecycleEvent),
    Pressure(PressureEvent),
}

impl EngineEvent {
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Lifecycle(event) => event.timestamp(),
            Self::Pressure(event) => event.timestamp,
        }
    }

    #[must_use]
    pub fn as_pressure(&self) -> Option<&PressureEvent> {
        match self {
            Self::Pressure(event) => Some(event),
            Self::Lifecycle(_) => None,
        }
    }

    #[must_use]
    pub fn as_lifecycle(&self) -> Option<&LifecycleEvent> {
        match self {
            Self::Lifecycle(event) => Some(event),
            Self::Pressure(_) => None,
        }
    }
}

impl From<LifecycleEvent> for EngineEvent {
    fn from(event: LifecycleEvent) -> Self {
        Self::Lifecycle(event)
    }
}

impl From<StatusChange> for EngineEvent {
    fn from(change: StatusChange) -> Self {
        Self::Lifecycle(change.into())
    }
}

impl From<PressureEvent> for EngineEvent {
    fn from(event: PressureEvent) -> Self {
        Self::Pressure(event)
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = self.timestamp().format("%Y-%m-%d %H:%M:%S");
        match self {
            Self::Pressure(p) => write!(
                f,
                "{ts} {} lock={} level={} elapsed={:.1}%",
                p.kind, p.lock_id, p.pressure_level, p.elapsed_percent
            ),
            Self::Lifecycle(event) => match event {
                LifecycleEvent::ObligationCreated {
                    id,
                    kind,
                    name,
                    units_required,
                    scheduled_at,
                    ..
                } => write!(
                    f,
                    "{ts} CREATED #{id} {kind} \"{name}\" x{units_required} due {}",
                    scheduled_at.format("%Y-%m-%d %H:%M")
                ),
                LifecycleEvent::StatusChanged { id, from, to, .. } => {
                    write!(f, "{ts} STATUS #{id} {from} -> {to}")
                }
                LifecycleEvent::ExecutionLogged {
                    id,
                    units,
                    units_completed,
                    units_required,
                    ..
                } => write!(
                    f,
                    "{ts} EXECUTION #{id} +{units} ({units_completed}/{units_required})"
                ),
                LifecycleEvent::ObligationDeleted { id, .. } => write!(f, "{ts} DELETED #{id}"),
                LifecycleEvent::LockAcquired {
                    lock_id,
                    obligation_id,
                    ..
                } => write!(f, "{ts} LOCK {lock_id} acquired by #{obligation_id}"),
                LifecycleEvent::LockReleased {
                    lock_id,
                    obligation_id,
                    outcome,
                    final_level,
                    ..
                } => write!(
                    f,
                    "{ts} LOCK {lock_id} released by #{obligation_id} ({}, final {final_level})",
                    outcome.as_str()
                ),
                LifecycleEvent::EscapeAttempted {
                    lock_id, attempts, ..
                } => write!(f, "{ts} ESCAPE lock={lock_id} attempts={attempts}"),
                LifecycleEvent::DebtAccrued {
                    obligation_id,
                    pressure_level,
                    amount,
                    total,
                    ..
                } => write!(
                    f,
                    "{ts} DEBT #{obligation_id} +{amount:.2} at {pressure_level} (total {total:.2})"
                ),
                LifecycleEvent::ChronicDelayActivated {
                    activation_count,
                    compression_factor,
                    ..
                } => write!(
                    f,
                    "{ts} CHRONIC DELAY activation {activation_count}, windows x{compression_factor:.1}"
                ),
            },
        }
    }
}

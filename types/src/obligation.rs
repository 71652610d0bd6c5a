//! The obligation entity and its pure state-transition function.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::ObligationId;
use crate::proofs::{NonEmptyString, PositiveUnits};
use crate::time::duration_ms;

/// How long before `scheduled_at` an obligation stops being deletable.
pub const BINDING_LEAD: TimeDelta = TimeDelta::hours(24);

/// Deadline for a window opening at `scheduled_at`, or `None` when the
/// binding instant, the deadline, or the instant just past it cannot be
/// represented.
#[must_use]
pub fn checked_deadline(
    scheduled_at: DateTime<Utc>,
    window: TimeDelta,
) -> Option<DateTime<Utc>> {
    scheduled_at.checked_sub_signed(BINDING_LEAD)?;
    let deadline = scheduled_at.checked_add_signed(window)?;
    deadline.checked_add_signed(TimeDelta::nanoseconds(1))?;
    Some(deadline)
}

/// What kind of work an obligation demands. Purely descriptive for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObligationKind {
    Workout,
    Meal,
    Habit,
    Custom,
}

const KIND_PARSE_VALUES: &[&str] = &["workout", "meal", "habit", "custom"];

impl ObligationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Workout => "workout",
            Self::Meal => "meal",
            Self::Habit => "habit",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ObligationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid obligation kind '{raw}'; expected one of: {expected:?}")]
pub struct KindParseError {
    raw: String,
    expected: &'static [&'static str],
}

impl FromStr for ObligationKind {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "workout" => Ok(Self::Workout),
            "meal" => Ok(Self::Meal),
            "habit" => Ok(Self::Habit),
            "custom" => Ok(Self::Custom),
            _ => Err(KindParseError {
                raw: s.to_string(),
                expected: KIND_PARSE_VALUES,
            }),
        }
    }
}

/// Lifecycle status. Ordering is monotonic: `Created < Binding < Bound <
/// {Executed, Failed}`; the two terminal states share a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObligationStatus {
    Created,
    Binding,
    Bound,
    Executed,
    Failed,
}

impl ObligationStatus {
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Binding => 1,
            Self::Bound => 2,
            Self::Executed | Self::Failed => 3,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Binding => "BINDING",
            Self::Bound => "BOUND",
            Self::Executed => "EXECUTED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ObligationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status transition applied to an obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: ObligationId,
    pub from: ObligationStatus,
    pub to: ObligationStatus,
    pub at: DateTime<Utc>,
}

/// Result of recording executed units against an obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionProgress {
    pub units_completed: u32,
    pub units_required: u32,
    /// `Some` when this log crossed the completion target.
    pub completed: Option<StatusChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("obligation {id} is already {status}")]
pub struct TerminalStatusError {
    pub id: ObligationId,
    pub status: ObligationStatus,
}

/// A scheduled unit of required execution with a deadline and completion target.
///
/// Fields are private: status only moves through [`Obligation::advance_to`]
/// and [`Obligation::record_execution`], both of which preserve the monotonic
/// ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    id: ObligationId,
    kind: ObligationKind,
    name: NonEmptyString,
    units_required: PositiveUnits,
    units_completed: u32,
    scheduled_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    window: TimeDelta,
    created_at: DateTime<Utc>,
    status: ObligationStatus,
    resolved_at: Option<DateTime<Utc>>,
}

impl Obligation {
    #[must_use]
    pub fn new(
        id: ObligationId,
        kind: ObligationKind,
        name: NonEmptyString,
        units_required: PositiveUnits,
        scheduled_at: DateTime<Utc>,
        window: TimeDelta,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            name,
            units_required,
            units_completed: 0,
            scheduled_at,
            window,
            created_at,
            status: ObligationStatus::Created,
            resolved_at: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> ObligationId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> ObligationKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    #[must_use]
    pub fn units_required(&self) -> u32 {
        self.units_required.get()
    }

    #[must_use]
    pub fn units_completed(&self) -> u32 {
        self.units_completed
    }

    #[must_use]
    pub fn units_remaining(&self) -> u32 {
        self.units_required.get().saturating_sub(self.units_completed)
    }

    #[must_use]
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    #[must_use]
    pub fn window(&self) -> TimeDelta {
        self.window
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn status(&self) -> ObligationStatus {
        self.status
    }

    #[must_use]
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    #[must_use]
    pub fn binds_at(&self) -> DateTime<Utc> {
        self.scheduled_at - BINDING_LEAD
    }

    /// Last instant at which the obligation can still be executed.
    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.scheduled_at + self.window
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline()
    }

    /// Instants at which time alone can change this obligation's status:
    /// binding, due, and the first representable instant past the deadline.
    /// None of them precede creation.
    #[must_use]
    pub fn lifecycle_instants(&self) -> [DateTime<Utc>; 3] {
        [
            self.binds_at(),
            self.scheduled_at,
            self.deadline() + TimeDelta::nanoseconds(1),
        ]
        .map(|instant| instant.max(self.created_at))
    }

    /// Move the status forward to whatever `now` implies.
    ///
    /// Returns the applied change, or `None` if nothing changed.
    pub fn advance_to(&mut self, now: DateTime<Utc>) -> Option<StatusChange> {
        let next = resolve_status(self, now);
        if next == self.status {
            return None;
        }
        Some(self.set_status(next, now))
    }

    /// Add executed units; crossing the target transitions to `Executed`.
    pub fn record_execution(
        &mut self,
        units: PositiveUnits,
        now: DateTime<Utc>,
    ) -> Result<ExecutionProgress, TerminalStatusError> {
        if self.status.is_terminal() {
            return Err(TerminalStatusError {
                id: self.id,
                status: self.status,
            });
        }
        self.units_completed = self.units_completed.saturating_add(units.get());
        let completed = (self.units_completed >= self.units_required.get())
            .then(|| self.set_status(ObligationStatus::Executed, now));
        Ok(ExecutionProgress {
            units_completed: self.units_completed,
            units_required: self.units_required.get(),
            completed,
        })
    }

    fn set_status(&mut self, next: ObligationStatus, now: DateTime<Utc>) -> StatusChange {
        debug_assert!(next.rank() >= self.status.rank());
        let change = StatusChange {
            id: self.id,
            from: self.status,
            to: next,
            at: now,
        };
        self.status = next;
        if next.is_terminal() {
            self.resolved_at = Some(now);
        }
        change
    }
}

/// Status the obligation should hold at `now`, judged by time alone.
///
/// Never returns `Executed` (only execution logs do that) and never ranks
/// below the current status, so a clock that jumps backwards cannot undo a
/// transition.
#[must_use]
pub fn resolve_status(obligation: &Obligation, now: DateTime<Utc>) -> ObligationStatus {
    let current = obligation.status;
    if current.is_terminal() {
        return current;
    }
    let by_time = if obligation.is_expired_at(now) {
        ObligationStatus::Failed
    } else if now >= obligation.scheduled_at {
        ObligationStatus::Bound
    } else if now >= obligation.binds_at() {
        ObligationStatus::Binding
    } else {
        ObligationStatus::Created
    };
    if by_time.rank() > current.rank() {
        by_time
    } else {
        current
    }
}

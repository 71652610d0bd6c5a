//! The single global lock and its pressure state.
//!
//! At most one lock exists. It is taken by a BOUND obligation, owns a
//! [`PressureState`] for its lifetime, and is archived as a [`LockRecord`]
//! when the obligation executes or fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vow_types::{
    EngineEvent, LifecycleEvent, LockId, LockOutcome, Obligation, ObligationId, ObligationStatus,
    PressureEventKind, PressureLevel,
};

use crate::errors::InvalidStateError;
use crate::pressure::PressureState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    id: LockId,
    obligation_id: ObligationId,
    locked_at: DateTime<Utc>,
    escape_attempts: u32,
}

impl Lock {
    #[must_use]
    pub fn id(&self) -> LockId {
        self.id
    }

    #[must_use]
    pub fn obligation_id(&self) -> ObligationId {
        self.obligation_id
    }

    #[must_use]
    pub fn locked_at(&self) -> DateTime<Utc> {
        self.locked_at
    }

    #[must_use]
    pub fn escape_attempts(&self) -> u32 {
        self.escape_attempts
    }
}

/// Archived lock with the pressure it ended at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub lock_id: LockId,
    pub obligation_id: ObligationId,
    pub outcome: LockOutcome,
    pub final_level: PressureLevel,
    pub prompt_count: u32,
    pub escape_attempts: u32,
    pub locked_at: DateTime<Utc>,
    pub released_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ActiveLock {
    lock: Lock,
    pressure: PressureState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockManager {
    active: Option<ActiveLock>,
    history: Vec<LockRecord>,
    last_lock_id: u64,
}

impl LockManager {
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn active_lock(&self) -> Option<&Lock> {
        self.active.as_ref().map(|active| &active.lock)
    }

    /// Obligation currently holding the lock.
    #[must_use]
    pub fn holder(&self) -> Option<ObligationId> {
        self.active.as_ref().map(|active| active.lock.obligation_id)
    }

    #[must_use]
    pub fn pressure(&self) -> Option<&PressureState> {
        self.active.as_ref().map(|active| &active.pressure)
    }

    pub fn pressure_mut(&mut self) -> Option<&mut PressureState> {
        self.active.as_mut().map(|active| &mut active.pressure)
    }

    #[must_use]
    pub fn history(&self) -> &[LockRecord] {
        &self.history
    }

    /// Lock `obligation` at `now`, starting its pressure at P0.
    ///
    /// Rejected without mutation when a lock is already held or the
    /// obligation is not BOUND.
    pub fn acquire(
        &mut self,
        obligation: &Obligation,
        now: DateTime<Utc>,
    ) -> Result<Vec<EngineEvent>, InvalidStateError> {
        if let Some(holder) = self.holder() {
            return Err(InvalidStateError::LockHeld { holder });
        }
        if obligation.status() != ObligationStatus::Bound {
            return Err(InvalidStateError::NotBound {
                id: obligation.id(),
                status: obligation.status(),
            });
        }

        self.last_lock_id += 1;
        let lock = Lock {
            id: LockId::new(self.last_lock_id),
            obligation_id: obligation.id(),
            locked_at: now,
            escape_attempts: 0,
        };
        let (pressure, initialized) = PressureState::start(lock.id, now, obligation.window());
        info!(lock = %lock.id, obligation = %lock.obligation_id, "Lock acquired");

        let events = vec![
            LifecycleEvent::LockAcquired {
                lock_id: lock.id,
                obligation_id: lock.obligation_id,
                at: now,
            }
            .into(),
            initialized.into(),
        ];
        self.active = Some(ActiveLock { lock, pressure });
        Ok(events)
    }

    /// Clear the lock and archive its pressure.
    pub fn release(
        &mut self,
        outcome: LockOutcome,
        now: DateTime<Utc>,
    ) -> Result<(LockRecord, Vec<EngineEvent>), InvalidStateError> {
        let ActiveLock { lock, pressure } =
            self.active.take().ok_or(InvalidStateError::NoActiveLock)?;

        let closing = match outcome {
            LockOutcome::Executed => PressureEventKind::ExecutionUnderPressure,
            LockOutcome::Failed => PressureEventKind::FailureUnderPressure,
        };
        let record = LockRecord {
            lock_id: lock.id,
            obligation_id: lock.obligation_id,
            outcome,
            final_level: pressure.level(),
            prompt_count: pressure.prompt_count(),
            escape_attempts: lock.escape_attempts,
            locked_at: lock.locked_at,
            released_at: now,
        };
        info!(
            lock = %lock.id,
            obligation = %lock.obligation_id,
            outcome = outcome.as_str(),
            level = %record.final_level,
            "Lock released"
        );

        let events = vec![
            pressure.event(closing, now).into(),
            pressure
                .event(PressureEventKind::PressureResolved, now)
                .into(),
            LifecycleEvent::LockReleased {
                lock_id: lock.id,
                obligation_id: lock.obligation_id,
                outcome,
                final_level: record.final_level,
                at: now,
            }
            .into(),
        ];
        self.history.push(record.clone());
        Ok((record, events))
    }

    /// Count an attempt to leave the lock screen. Changes nothing else.
    pub fn log_escape_attempt(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<EngineEvent, InvalidStateError> {
        let active = self.active.as_mut().ok_or(InvalidStateError::NoActiveLock)?;
        active.lock.escape_attempts = active.lock.escape_attempts.saturating_add(1);
        debug!(
            lock = %active.lock.id,
            attempts = active.lock.escape_attempts,
            "Escape attempt logged"
        );
        Ok(LifecycleEvent::EscapeAttempted {
            lock_id: active.lock.id,
            attempts: active.lock.escape_attempts,
            at: now,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};
    use vow_types::{NonEmptyString, ObligationKind, PositiveUnits};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 7, 0, 0).unwrap()
    }

    fn bound(id: u64) -> Obligation {
        let mut obligation = Obligation::new(
            ObligationId::new(id),
            ObligationKind::Workout,
            NonEmptyString::new("PUSH-UPS").unwrap(),
            PositiveUnits::new(100).unwrap(),
            t0(),
            TimeDelta::hours(4),
            t0() - TimeDelta::hours(1),
        );
        obligation.advance_to(t0());
        assert_eq!(obligation.status(), ObligationStatus::Bound);
        obligation
    }

    #[test]
    fn acquire_starts_pressure_at_p0() {
        let mut locks = LockManager::default();
        let events = locks.acquire(&bound(1), t0()).unwrap();

        assert_eq!(locks.holder(), Some(ObligationId::new(1)));
        assert_eq!(locks.pressure().unwrap().level(), PressureLevel::P0);
        assert_eq!(
            events[1].as_pressure().unwrap().kind,
            PressureEventKind::PressureInitialized
        );
    }

    #[test]
    fn second_acquire_is_rejected_without_mutation() {
        let mut locks = LockManager::default();
        locks.acquire(&bound(1), t0()).unwrap();
        let before = locks.clone();

        let err = locks.acquire(&bound(2), t0()).unwrap_err();
        assert_eq!(
            err,
            InvalidStateError::LockHeld {
                holder: ObligationId::new(1)
            }
        );
        assert_eq!(locks, before);
    }

    #[test]
    fn only_bound_obligations_can_lock() {
        let mut locks = LockManager::default();
        let mut pending = bound(1);
        pending.advance_to(t0() + TimeDelta::hours(5));
        assert!(matches!(
            locks.acquire(&pending, t0()),
            Err(InvalidStateError::NotBound { .. })
        ));
        assert!(!locks.is_locked());
    }

    #[test]
    fn release_archives_final_level() {
        let mut locks = LockManager::default();
        locks.acquire(&bound(1), t0()).unwrap();
        locks
            .pressure_mut()
            .unwrap()
            .escalate(t0() + TimeDelta::hours(3));
        locks.log_escape_attempt(t0()).unwrap();

        let (record, events) = locks
            .release(LockOutcome::Failed, t0() + TimeDelta::hours(4))
            .unwrap();
        assert_eq!(record.final_level, PressureLevel::P3);
        assert_eq!(record.escape_attempts, 1);
        assert!(!locks.is_locked());
        assert_eq!(locks.history(), &[record]);

        let kinds: Vec<_> = events
            .iter()
            .filter_map(EngineEvent::as_pressure)
            .map(|event| event.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                PressureEventKind::FailureUnderPressure,
                PressureEventKind::PressureResolved
            ]
        );
    }

    #[test]
    fn lock_ids_keep_increasing() {
        let mut locks = LockManager::default();
        locks.acquire(&bound(1), t0()).unwrap();
        locks.release(LockOutcome::Executed, t0()).unwrap();
        locks.acquire(&bound(2), t0()).unwrap();
        assert_eq!(locks.active_lock().unwrap().id(), LockId::new(2));
    }

    #[test]
    fn escape_without_lock_is_invalid() {
        let mut locks = LockManager::default();
        assert_eq!(
            locks.log_escape_attempt(t0()),
            Err(InvalidStateError::NoActiveLock)
        );
    }
}

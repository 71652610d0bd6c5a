//! The engine facade: every public operation on obligations, the lock,
//! pressure and debt goes through [`Engine`].
//!
//! # Ticks
//!
//! Nothing in the engine runs on a timer. [`Engine::tick`] recomputes every
//! time-driven transition for the instant it is given. When ticks were
//! missed, the tick first replays each lifecycle instant (binding, due,
//! just-past-deadline) that fell between the previous tick and `now`, so one
//! late tick leaves exactly the state a steady heartbeat would have.
//!
//! Each evaluation step runs, in order:
//!
//! 1. status transitions, earliest-due first
//! 2. forced release of a lock whose obligation just failed
//! 3. lock acquisition by the earliest BOUND obligation
//! 4. pressure escalation (and prompts, at `now` only)
//! 5. debt for every obligation that just failed
//!
//! # Persistence
//!
//! Each public mutation that emitted events saves the full state once before
//! returning. Inside [`Engine::batch`] the save is deferred to the end of the
//! outermost batch. Save failures are recorded in [`SyncStatus`] and retried
//! on the next mutation; they never undo the in-memory change.

use std::mem;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use vow_types::{
    EngineEvent, LifecycleEvent, LockOutcome, NonEmptyString, Obligation, ObligationId,
    ObligationKind, ObligationStatus, PositiveUnits, PressureLevel, checked_deadline,
    resolve_status,
};

use crate::clock::Clock;
use crate::debt::{DebtLedger, UNLOCKED_FAILURE_LEVEL};
use crate::errors::{EngineError, InvalidStateError, PersistenceError, ValidationError};
use crate::event_log::EventLog;
use crate::lock::{Lock, LockRecord};
use crate::persistence::{EngineState, StateStore, SyncStatus};
use crate::pressure::{LevelProfile, PressureState, PromptTable};
use crate::settings::EngineSettings;

pub struct Engine<S> {
    state: EngineState,
    store: S,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    prompts: PromptTable,
    sync: SyncStatus,
    batch_depth: u32,
    /// State changed since the last successful save.
    dirty: bool,
}

impl<S: StateStore> Engine<S> {
    /// Load saved state from `store`, or start empty if there is none.
    ///
    /// A load failure is returned rather than papered over: starting from an
    /// empty ledger would overwrite recorded debt on the next save.
    pub fn open(
        mut store: S,
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let state = store.load()?.unwrap_or_default();
        info!(
            obligations = state.obligations.len(),
            locked = state.locks.is_locked(),
            debt = state.ledger.debt_units(),
            "Engine opened"
        );
        Ok(Self {
            state,
            store,
            clock,
            settings,
            prompts: PromptTable::builtin(),
            sync: SyncStatus::Synced,
            batch_depth: 0,
            dirty: false,
        })
    }

    pub fn with_prompts(mut self, prompts: PromptTable) -> Self {
        self.prompts = prompts;
        self
    }

    // ── Obligations ──────────────────────────────────────────

    /// Schedule a new obligation.
    ///
    /// Its window is the standard window after chronic-delay compression. A
    /// schedule whose whole window has already passed is rejected; one that
    /// is merely due becomes BOUND on the next tick.
    pub fn create_obligation(
        &mut self,
        kind: ObligationKind,
        name: &str,
        units_required: u32,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(ObligationId, Vec<EngineEvent>), EngineError> {
        let name = NonEmptyString::new(name).map_err(|_| ValidationError::EmptyName)?;
        let units_required =
            PositiveUnits::new(units_required).map_err(|_| ValidationError::ZeroUnits)?;
        let now = self.clock.now();
        let window = self.state.ledger.window_for(self.settings.standard_window());
        let deadline = checked_deadline(scheduled_at, window)
            .ok_or(ValidationError::ScheduleOutOfRange { scheduled_at })?;
        if now > deadline {
            return Err(ValidationError::ExpiredSchedule {
                scheduled_at,
                deadline,
            }
            .into());
        }

        let obligation = self.state.obligations.insert(
            kind,
            name,
            units_required,
            scheduled_at,
            window,
            now,
        );
        let id = obligation.id();
        debug!(obligation = %id, %kind, %scheduled_at, "Obligation created");
        let event = LifecycleEvent::ObligationCreated {
            id,
            kind,
            name: obligation.name().to_string(),
            units_required: obligation.units_required(),
            scheduled_at,
            window_ms: window.num_milliseconds(),
            at: now,
        };
        Ok((id, self.commit(vec![event.into()])))
    }

    /// Record executed units. Reaching the target marks the obligation
    /// EXECUTED and frees the lock if it held it.
    pub fn log_execution(
        &mut self,
        id: ObligationId,
        units: u32,
    ) -> Result<Vec<EngineEvent>, EngineError> {
        let units = PositiveUnits::new(units).map_err(|_| ValidationError::ZeroUnits)?;
        let now = self.clock.now();
        let obligation = self
            .state
            .obligations
            .get_mut(id)
            .ok_or(EngineError::NotFound(id))?;
        if obligation.is_expired_at(now) && !obligation.status().is_terminal() {
            return Err(InvalidStateError::WindowExpired {
                id,
                deadline: obligation.deadline(),
            }
            .into());
        }
        let progress = obligation
            .record_execution(units, now)
            .map_err(InvalidStateError::from)?;

        let mut events: Vec<EngineEvent> = vec![
            LifecycleEvent::ExecutionLogged {
                id,
                units: units.get(),
                units_completed: progress.units_completed,
                units_required: progress.units_required,
                at: now,
            }
            .into(),
        ];
        if let Some(change) = progress.completed {
            info!(obligation = %id, from = %change.from, "Obligation executed");
            events.push(change.into());
            self.state.ledger.record_execution();
            if self.state.locks.holder() == Some(id) {
                self.escalate_pressure(now, &mut events);
                self.release_lock(LockOutcome::Executed, now, &mut events);
                self.acquire_next(now, &mut events);
            }
        }
        Ok(self.commit(events))
    }

    /// Delete an obligation that has not started binding yet.
    pub fn delete_obligation(
        &mut self,
        id: ObligationId,
    ) -> Result<Vec<EngineEvent>, EngineError> {
        let now = self.clock.now();
        let obligation = self
            .state
            .obligations
            .get(id)
            .ok_or(EngineError::NotFound(id))?;
        let status = resolve_status(obligation, now);
        if status != ObligationStatus::Created {
            return Err(InvalidStateError::NotDeletable { id, status }.into());
        }
        self.state.obligations.archive(id);
        info!(obligation = %id, "Obligation deleted");
        Ok(self.commit(vec![
            LifecycleEvent::ObligationDeleted { id, at: now }.into(),
        ]))
    }

    /// Count an attempt to leave the lock. Observational only.
    pub fn log_escape_attempt(&mut self) -> Result<Vec<EngineEvent>, EngineError> {
        let now = self.clock.now();
        let event = self.state.locks.log_escape_attempt(now)?;
        Ok(self.commit(vec![event]))
    }

    // ── Heartbeat ────────────────────────────────────────────

    /// Bring every time-driven transition up to `now`.
    ///
    /// Idempotent for a repeated `now`. A `now` earlier than a previous tick
    /// cannot regress any status or pressure level.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Vec<EngineEvent>, EngineError> {
        let mut events = Vec::new();
        let missed = self
            .state
            .obligations
            .lifecycle_instants(self.state.last_tick, now);
        if !missed.is_empty() {
            debug!(instants = missed.len(), %now, "Replaying missed lifecycle instants");
        }
        for instant in missed {
            self.advance(instant, false, &mut events);
        }
        self.advance(now, true, &mut events);
        self.state.last_tick = Some(self.state.last_tick.map_or(now, |last| last.max(now)));
        Ok(self.commit(events))
    }

    fn advance(
        &mut self,
        at: DateTime<Utc>,
        deliver_prompts: bool,
        events: &mut Vec<EngineEvent>,
    ) {
        let mut failed = Vec::new();
        for change in self.state.obligations.advance_all(at) {
            debug!(obligation = %change.id, from = %change.from, to = %change.to, "Status changed");
            if change.to == ObligationStatus::Failed {
                failed.push(change.id);
            }
            events.push(change.into());
        }

        let mut released = None;
        if let Some(holder) = self.state.locks.holder()
            && failed.contains(&holder)
        {
            self.escalate_pressure(at, events);
            released = self
                .release_lock(LockOutcome::Failed, at, events)
                .map(|level| (holder, level));
        }

        self.acquire_next(at, events);
        self.escalate_pressure(at, events);
        if deliver_prompts {
            self.deliver_prompt(at, events);
        }

        for id in failed {
            let level = match released {
                Some((holder, level)) if holder == id => level,
                _ => UNLOCKED_FAILURE_LEVEL,
            };
            self.charge_failure(id, level, at, events);
        }
    }

    fn acquire_next(&mut self, at: DateTime<Utc>, events: &mut Vec<EngineEvent>) {
        if self.state.locks.is_locked() {
            return;
        }
        let Some(candidate) = self.state.obligations.next_bound() else {
            return;
        };
        match self.state.locks.acquire(candidate, at) {
            Ok(acquired) => events.extend(acquired),
            Err(err) => warn!("Lock acquisition skipped: {err}"),
        }
    }

    fn release_lock(
        &mut self,
        outcome: LockOutcome,
        at: DateTime<Utc>,
        events: &mut Vec<EngineEvent>,
    ) -> Option<PressureLevel> {
        match self.state.locks.release(outcome, at) {
            Ok((record, released)) => {
                events.extend(released);
                Some(record.final_level)
            }
            Err(err) => {
                warn!("Lock release skipped: {err}");
                None
            }
        }
    }

    fn escalate_pressure(&mut self, at: DateTime<Utc>, events: &mut Vec<EngineEvent>) {
        if let Some(pressure) = self.state.locks.pressure_mut()
            && let Some(event) = pressure.escalate(at)
        {
            events.push(event.into());
        }
    }

    fn deliver_prompt(&mut self, at: DateTime<Utc>, events: &mut Vec<EngineEvent>) {
        if let Some(pressure) = self.state.locks.pressure_mut()
            && let Some(event) = pressure.deliver_prompt(&self.prompts, at)
        {
            events.push(event.into());
        }
    }

    fn charge_failure(
        &mut self,
        id: ObligationId,
        level: PressureLevel,
        at: DateTime<Utc>,
        events: &mut Vec<EngineEvent>,
    ) {
        let penalty = self.state.ledger.record_failure(level);
        info!(
            obligation = %id,
            %level,
            amount = penalty.amount,
            total = penalty.total,
            "Debt accrued"
        );
        events.push(
            LifecycleEvent::DebtAccrued {
                obligation_id: id,
                pressure_level: level,
                base: penalty.base,
                multiplier: penalty.multiplier,
                amount: penalty.amount,
                total: penalty.total,
                failure_count: penalty.failure_count,
                at,
            }
            .into(),
        );
        if penalty.chronic_activated {
            let ledger = &self.state.ledger;
            info!(
                activations = ledger.chronic_activation_count(),
                factor = ledger.compression_factor(),
                "Chronic delay activated"
            );
            events.push(
                LifecycleEvent::ChronicDelayActivated {
                    activation_count: ledger.chronic_activation_count(),
                    compression_factor: ledger.compression_factor(),
                    at,
                }
                .into(),
            );
        }
    }

    // ── Units of work and persistence ────────────────────────

    /// Run `work` as one unit: nested operations save once, at the end of
    /// the outermost batch.
    ///
    /// Each operation inside is still individually atomic. An error from
    /// `work` does not undo operations that already succeeded.
    pub fn batch<T>(
        &mut self,
        work: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.batch_depth += 1;
        let result = work(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 && self.dirty {
            let _ = self.persist();
        }
        result
    }

    /// Save now if the durable copy is behind memory.
    pub fn retry_sync(&mut self) -> Result<(), PersistenceError> {
        if !self.dirty {
            return Ok(());
        }
        self.persist()
    }

    fn commit(&mut self, events: Vec<EngineEvent>) -> Vec<EngineEvent> {
        if !events.is_empty() {
            self.state.events.append(&events);
            self.dirty = true;
        }
        if self.batch_depth == 0 && self.dirty {
            let _ = self.persist();
        }
        events
    }

    fn persist(&mut self) -> Result<(), PersistenceError> {
        match self.store.save(&self.state) {
            Ok(()) => {
                if !self.sync.is_synced() {
                    info!("State saved after earlier failures");
                }
                self.sync = SyncStatus::Synced;
                self.dirty = false;
                Ok(())
            }
            Err(err) => {
                let last_error = err.to_string();
                warn!("Failed to save state: {last_error}");
                self.sync = match mem::take(&mut self.sync) {
                    SyncStatus::Synced => SyncStatus::Unsynced {
                        since: self.clock.now(),
                        attempts: 1,
                        last_error,
                    },
                    SyncStatus::Unsynced {
                        since, attempts, ..
                    } => SyncStatus::Unsynced {
                        since,
                        attempts: attempts.saturating_add(1),
                        last_error,
                    },
                };
                Err(err)
            }
        }
    }

    // ── Queries ──────────────────────────────────────────────

    #[must_use]
    pub fn get_locked_obligation(&self) -> Option<&Obligation> {
        self.state
            .locks
            .holder()
            .and_then(|id| self.state.obligations.get(id))
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.locks.is_locked()
    }

    /// Non-terminal obligations, earliest due first.
    #[must_use]
    pub fn get_pending_obligations(&self) -> Vec<&Obligation> {
        self.state.obligations.pending()
    }

    /// Earliest pending obligation other than the one holding the lock.
    #[must_use]
    pub fn get_next_obligation(&self) -> Option<&Obligation> {
        let holder = self.state.locks.holder();
        self.state
            .obligations
            .pending()
            .into_iter()
            .find(|obligation| Some(obligation.id()) != holder)
    }

    #[must_use]
    pub fn obligation(&self, id: ObligationId) -> Option<&Obligation> {
        self.state.obligations.get(id)
    }

    /// Every live obligation in creation order, terminal ones included.
    pub fn obligations(&self) -> impl Iterator<Item = &Obligation> {
        self.state.obligations.iter()
    }

    #[must_use]
    pub fn archived(&self) -> &[Obligation] {
        self.state.obligations.archived()
    }

    #[must_use]
    pub fn ledger(&self) -> &DebtLedger {
        &self.state.ledger
    }

    #[must_use]
    pub fn active_lock(&self) -> Option<&Lock> {
        self.state.locks.active_lock()
    }

    #[must_use]
    pub fn pressure(&self) -> Option<&PressureState> {
        self.state.locks.pressure()
    }

    /// Prompt profile for the active lock's current level.
    #[must_use]
    pub fn current_prompt(&self) -> Option<&LevelProfile> {
        self.pressure()
            .map(|pressure| self.prompts.profile(pressure.level()))
    }

    #[must_use]
    pub fn prompts(&self) -> &PromptTable {
        &self.prompts
    }

    #[must_use]
    pub fn lock_history(&self) -> &[LockRecord] {
        self.state.locks.history()
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.state.events
    }

    #[must_use]
    pub fn sync_status(&self) -> &SyncStatus {
        &self.sync
    }

    #[must_use]
    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        self.state.last_tick
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    #[must_use]
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

//! Durable state boundary.
//!
//! The engine hands its whole [`EngineState`] to a [`StateStore`] after every
//! mutation (or once per batch). A failed save never rolls back the in-memory
//! operation; the engine tracks the gap as [`SyncStatus::Unsynced`] and
//! retries with the full state on the next opportunity.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vow_utils::{BackupRecovery, ensure_private_dir, recover_backup, write_atomic};

use crate::debt::DebtLedger;
use crate::errors::PersistenceError;
use crate::event_log::EventLog;
use crate::lock::LockManager;
use crate::store::ObligationStore;

pub const STATE_VERSION: u32 = 1;

/// Everything that survives a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub version: u32,
    #[serde(default)]
    pub obligations: ObligationStore,
    #[serde(default)]
    pub ledger: DebtLedger,
    #[serde(default)]
    pub locks: LockManager,
    #[serde(default)]
    pub events: EventLog,
    /// Latest `now` any tick has seen.
    #[serde(default)]
    pub last_tick: Option<DateTime<Utc>>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            obligations: ObligationStore::default(),
            ledger: DebtLedger::default(),
            locks: LockManager::default(),
            events: EventLog::default(),
            last_tick: None,
        }
    }
}

pub trait StateStore {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&mut self) -> Result<Option<EngineState>, PersistenceError>;

    fn save(&mut self, state: &EngineState) -> Result<(), PersistenceError>;
}

/// Pretty-printed JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&mut self) -> Result<Option<EngineState>, PersistenceError> {
        if recover_backup(&self.path) == BackupRecovery::Failed {
            warn!(path = %self.path.display(), "State backup present but not restorable");
        }
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No saved state");
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)?;
        let state: EngineState =
            serde_json::from_str(&json).map_err(PersistenceError::Deserialize)?;
        if state.version != STATE_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: state.version,
                expected: STATE_VERSION,
            });
        }
        debug!(
            path = %self.path.display(),
            obligations = state.obligations.len(),
            events = state.events.len(),
            "Loaded state"
        );
        Ok(Some(state))
    }

    fn save(&mut self, state: &EngineState) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            ensure_private_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(state).map_err(PersistenceError::Serialize)?;
        write_atomic(&self.path, json.as_bytes())?;
        Ok(())
    }
}

/// Store that keeps the last saved state in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    saved: Option<EngineState>,
    save_count: u64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_state(state: EngineState) -> Self {
        Self {
            saved: Some(state),
            save_count: 0,
        }
    }

    #[must_use]
    pub fn saved(&self) -> Option<&EngineState> {
        self.saved.as_ref()
    }

    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.save_count
    }
}

impl StateStore for MemoryStore {
    fn load(&mut self) -> Result<Option<EngineState>, PersistenceError> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, state: &EngineState) -> Result<(), PersistenceError> {
        self.saved = Some(state.clone());
        self.save_count += 1;
        Ok(())
    }
}

/// Whether the durable copy matches memory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Synced,
    Unsynced {
        /// When the first unsaved mutation failed to persist.
        since: DateTime<Utc>,
        attempts: u32,
        last_error: String,
    },
}

impl SyncStatus {
    #[must_use]
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced)
    }
}

//! Error types for engine operations.
//!
//! Every variant except [`PersistenceError`] means the operation was rejected
//! and nothing was mutated.

use std::io;

use chrono::{DateTime, Utc};
use thiserror::Error;
use vow_types::{ObligationId, ObligationStatus};

use crate::pressure::PromptTableError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),
    #[error("obligation {0} not found")]
    NotFound(ObligationId),
    #[error("a tick is already in progress; retry after it completes")]
    Concurrency,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("obligation name must not be empty")]
    EmptyName,
    #[error("units must be greater than zero")]
    ZeroUnits,
    #[error("window for {scheduled_at} already closed at {deadline}")]
    ExpiredSchedule {
        scheduled_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    },
    #[error("schedule {scheduled_at} is outside the representable time range")]
    ScheduleOutOfRange { scheduled_at: DateTime<Utc> },
    #[error("window must be longer than zero")]
    NonPositiveWindow,
    #[error(transparent)]
    PromptTable(#[from] PromptTableError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidStateError {
    #[error("obligation {id} is {status}; only CREATED obligations can be deleted")]
    NotDeletable {
        id: ObligationId,
        status: ObligationStatus,
    },
    #[error("lock already held for obligation {holder}")]
    LockHeld { holder: ObligationId },
    #[error("obligation {id} is already {status}")]
    Terminal {
        id: ObligationId,
        status: ObligationStatus,
    },
    #[error("window for obligation {id} closed at {deadline}")]
    WindowExpired {
        id: ObligationId,
        deadline: DateTime<Utc>,
    },
    #[error("no lock is held")]
    NoActiveLock,
    #[error("obligation {id} is {status}; only BOUND obligations can be locked")]
    NotBound {
        id: ObligationId,
        status: ObligationStatus,
    },
}

impl From<vow_types::TerminalStatusError> for InvalidStateError {
    fn from(err: vow_types::TerminalStatusError) -> Self {
        Self::Terminal {
            id: err.id,
            status: err.status,
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to parse state: {0}")]
    Deserialize(#[source] serde_json::Error),
    #[error("state schema version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

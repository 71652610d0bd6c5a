//! Engine tunables that come from configuration.

use chrono::TimeDelta;

use crate::errors::ValidationError;

pub const DEFAULT_STANDARD_WINDOW: TimeDelta = TimeDelta::hours(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    standard_window: TimeDelta,
}

impl EngineSettings {
    /// `standard_window` is the window granted before chronic-delay
    /// compression. It may be shorter than the compression floor.
    pub fn new(standard_window: TimeDelta) -> Result<Self, ValidationError> {
        if standard_window <= TimeDelta::zero() {
            return Err(ValidationError::NonPositiveWindow);
        }
        Ok(Self { standard_window })
    }

    pub fn from_minutes(minutes: u32) -> Result<Self, ValidationError> {
        Self::new(TimeDelta::minutes(i64::from(minutes)))
    }

    #[must_use]
    pub fn standard_window(&self) -> TimeDelta {
        self.standard_window
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            standard_window: DEFAULT_STANDARD_WINDOW,
        }
    }
}

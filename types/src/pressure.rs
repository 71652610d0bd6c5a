//! Pressure levels and the elapsed-window thresholds that select them.

use std::fmt;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Discrete escalation stage of an active lock.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum PressureLevel {
    #[default]
    P0,
    P1,
    P2,
    P3,
    P4,
}

impl PressureLevel {
    pub const ALL: [Self; 5] = [Self::P0, Self::P1, Self::P2, Self::P3, Self::P4];

    /// Inclusive lower bound, in percent of the window, for each level.
    #[must_use]
    pub const fn threshold_percent(self) -> u32 {
        match self {
            Self::P0 => 0,
            Self::P1 => 25,
            Self::P2 => 50,
            Self::P3 => 75,
            Self::P4 => 90,
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Highest level whose threshold `percent` satisfies.
    #[must_use]
    pub fn for_percent(percent: f64) -> Self {
        Self::ALL
            .into_iter()
            .rev()
            .find(|level| percent >= f64::from(level.threshold_percent()))
            .unwrap_or(Self::P0)
    }

    /// Highest level satisfied after `elapsed` of `window`.
    ///
    /// Compares in integer nanoseconds so a boundary such as exactly 25% lands
    /// on the higher level without float rounding.
    #[must_use]
    pub fn for_elapsed(elapsed: TimeDelta, window: TimeDelta) -> Self {
        let (Some(elapsed), Some(window)) = (elapsed.num_nanoseconds(), window.num_nanoseconds())
        else {
            return Self::for_percent(elapsed_percent(elapsed, window));
        };
        if elapsed <= 0 || window <= 0 {
            return Self::P0;
        }
        let scaled = i128::from(elapsed) * 100;
        Self::ALL
            .into_iter()
            .rev()
            .find(|level| scaled >= i128::from(level.threshold_percent()) * i128::from(window))
            .unwrap_or(Self::P0)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
            Self::P4 => "P4",
        }
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `elapsed / window * 100`, for reporting. Negative elapsed reports as 0.
#[must_use]
pub fn elapsed_percent(elapsed: TimeDelta, window: TimeDelta) -> f64 {
    let window_ms = window.num_milliseconds();
    if window_ms <= 0 {
        return 100.0;
    }
    let elapsed_ms = elapsed.num_milliseconds().max(0);
    elapsed_ms as f64 / window_ms as f64 * 100.0
}

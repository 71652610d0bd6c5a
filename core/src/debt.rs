//! Debt and chronic-delay accounting.
//!
//! Every failure costs `failure_count` debt units before the count is bumped,
//! scaled by how much pressure the user was under when the window closed.
//! Three consecutive high-pressure failures activate chronic delay, which
//! shrinks the window granted to every obligation created afterwards.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use vow_types::PressureLevel;

/// Consecutive failures at P3 or above that activate chronic delay.
pub const CHRONIC_THRESHOLD: u32 = 3;
/// Activations after which compression deepens.
pub const SEVERE_ACTIVATION_COUNT: u32 = 3;
pub const CHRONIC_COMPRESSION: f64 = 0.9;
pub const SEVERE_COMPRESSION: f64 = 0.8;
/// Compression never shortens a window below this.
pub const MINIMUM_WINDOW: TimeDelta = TimeDelta::hours(2);
/// Level charged when an obligation fails without ever holding the lock.
pub const UNLOCKED_FAILURE_LEVEL: PressureLevel = PressureLevel::P0;

#[must_use]
pub fn failure_multiplier(level: PressureLevel) -> f64 {
    if level >= PressureLevel::P4 {
        1.5
    } else if level >= PressureLevel::P3 {
        1.25
    } else {
        1.0
    }
}

/// Apply `factor` to `standard`, clamped to `[MINIMUM_WINDOW, standard]`.
///
/// The ceiling wins when the standard window is itself below the floor.
#[must_use]
pub fn compress_window(standard: TimeDelta, factor: f64) -> TimeDelta {
    if factor >= 1.0 {
        return standard;
    }
    let scaled_ms = (standard.num_milliseconds() as f64 * factor).round() as i64;
    TimeDelta::milliseconds(scaled_ms)
        .max(MINIMUM_WINDOW)
        .min(standard)
}

/// What a single failure cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailurePenalty {
    pub level: PressureLevel,
    pub base: f64,
    pub multiplier: f64,
    pub amount: f64,
    pub total: f64,
    /// Failure count after this failure.
    pub failure_count: u32,
    /// `true` when this failure tipped the ledger into a new chronic activation.
    pub chronic_activated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebtLedger {
    debt_units: f64,
    failure_count: u32,
    chronic_delay: bool,
    chronic_activation_count: u32,
    consecutive_high_pressure_failures: u32,
}

impl DebtLedger {
    #[must_use]
    pub fn debt_units(&self) -> f64 {
        self.debt_units
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    #[must_use]
    pub fn chronic_delay(&self) -> bool {
        self.chronic_delay
    }

    #[must_use]
    pub fn chronic_activation_count(&self) -> u32 {
        self.chronic_activation_count
    }

    #[must_use]
    pub fn consecutive_high_pressure_failures(&self) -> u32 {
        self.consecutive_high_pressure_failures
    }

    #[must_use]
    pub fn compression_factor(&self) -> f64 {
        if self.chronic_activation_count >= SEVERE_ACTIVATION_COUNT {
            SEVERE_COMPRESSION
        } else if self.chronic_delay {
            CHRONIC_COMPRESSION
        } else {
            1.0
        }
    }

    /// Window a newly created obligation receives.
    #[must_use]
    pub fn window_for(&self, standard: TimeDelta) -> TimeDelta {
        compress_window(standard, self.compression_factor())
    }

    pub fn record_failure(&mut self, level: PressureLevel) -> FailurePenalty {
        let base = f64::from(self.failure_count);
        let multiplier = failure_multiplier(level);
        let amount = base * multiplier;
        self.debt_units += amount;
        self.failure_count = self.failure_count.saturating_add(1);

        let mut chronic_activated = false;
        if level >= PressureLevel::P3 {
            self.consecutive_high_pressure_failures += 1;
            if self.consecutive_high_pressure_failures >= CHRONIC_THRESHOLD {
                self.chronic_delay = true;
                self.chronic_activation_count = self.chronic_activation_count.saturating_add(1);
                self.consecutive_high_pressure_failures = 0;
                chronic_activated = true;
            }
        } else {
            self.consecutive_high_pressure_failures = 0;
        }

        FailurePenalty {
            level,
            base,
            multiplier,
            amount,
            total: self.debt_units,
            failure_count: self.failure_count,
            chronic_activated,
        }
    }

    /// An executed obligation breaks any run of high-pressure failures.
    pub fn record_execution(&mut self) {
        self.consecutive_high_pressure_failures = 0;
    }
}

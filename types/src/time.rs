//! Serde helpers for `chrono::TimeDelta`.
//!
//! chrono serializes `DateTime` natively but has no stable representation for
//! `TimeDelta`, so windows are stored as whole milliseconds.

use chrono::TimeDelta;
use serde::{Deserialize, Deserializer, Serializer};

pub mod duration_ms {
    use serde::de::Error;

    use super::{Deserialize, Deserializer, Serializer, TimeDelta};

    pub fn serialize<S: Serializer>(value: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        TimeDelta::try_milliseconds(millis)
            .ok_or_else(|| D::Error::custom(format!("duration out of range: {millis}ms")))
    }
}

/// Render a duration as `1h05m`, `12m30s` or `45s`.
#[must_use]
pub fn format_duration(value: TimeDelta) -> String {
    let total = value.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.unsigned_abs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{sign}{hours}h{minutes:02}m")
    } else if minutes > 0 {
        format!("{sign}{minutes}m{seconds:02}s")
    } else {
        format!("{sign}{seconds}s")
    }
}

//! Command-line parsing.

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use vow_types::{ObligationId, ObligationKind};

#[derive(Debug, Parser)]
#[command(name = "vow", version)]
#[command(about = "Commitment engine that locks you onto obligations until they are done")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Schedule an obligation (due now unless --at or --in is given)
    Add {
        /// workout, meal, habit or custom
        kind: ObligationKind,
        /// What has to be done
        name: String,
        /// Units required to execute it
        units: u32,
        /// Due time as RFC 3339, e.g. 2026-09-01T07:30:00+02:00
        #[arg(long, conflicts_with = "in_minutes")]
        at: Option<DateTime<Utc>>,
        /// Due this many minutes from now
        #[arg(long = "in", value_name = "MINUTES")]
        in_minutes: Option<u32>,
    },
    /// Record executed units
    Log {
        /// Obligation id, with or without a leading `#`
        #[arg(value_parser = parse_id)]
        id: ObligationId,
        units: u32,
    },
    /// Record an attempt to leave the lock
    Escape,
    /// Delete an obligation that has not started binding
    Delete {
        #[arg(value_parser = parse_id)]
        id: ObligationId,
    },
    /// Catch up and print what changed
    Tick,
    /// Show the lock, pressure, pending obligations and debt
    Status,
    /// Print the most recent events
    Events {
        #[arg(default_value_t = 20)]
        count: usize,
    },
    /// Heartbeat until Ctrl-C
    Run,
}

impl Command {
    /// Due instant for `add`; `None` for every other command.
    #[must_use]
    pub fn due_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let Self::Add { at, in_minutes, .. } = self else {
            return None;
        };
        Some(match (at, in_minutes) {
            (Some(at), _) => *at,
            (None, Some(minutes)) => now + TimeDelta::minutes(i64::from(*minutes)),
            (None, None) => now,
        })
    }
}

fn parse_id(raw: &str) -> Result<ObligationId, String> {
    let digits = raw.strip_prefix('#').unwrap_or(raw);
    digits
        .parse()
        .map(ObligationId::new)
        .map_err(|e| format!("invalid obligation id `{raw}`: {e}"))
}

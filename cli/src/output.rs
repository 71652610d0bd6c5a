//! Plain-text rendering of engine state for the terminal.

use chrono::{DateTime, Utc};
use vow_core::{Engine, LoggedEvent, StateStore, SyncStatus};
use vow_types::EngineEvent;
use vow_types::time::format_duration;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn print_events(events: &[EngineEvent]) {
    for event in events {
        println!("{event}");
    }
}

pub fn print_log(entries: &[LoggedEvent]) {
    if entries.is_empty() {
        println!("no events");
        return;
    }
    for entry in entries {
        println!("{:>6}  {}", entry.seq, entry.event);
    }
}

pub fn print_status<S: StateStore>(engine: &Engine<S>, now: DateTime<Utc>) {
    match (engine.get_locked_obligation(), engine.active_lock(), engine.pressure()) {
        (Some(obligation), Some(lock), Some(pressure)) => {
            println!(
                "LOCKED  #{} {} \"{}\"  {}/{} units",
                obligation.id(),
                obligation.kind(),
                obligation.name(),
                obligation.units_completed(),
                obligation.units_required()
            );
            println!(
                "        {} at {:.1}% of window, deadline {} ({} left), escapes {}",
                pressure.level(),
                pressure.elapsed_percent(now),
                obligation.deadline().format(TIME_FORMAT),
                format_duration(obligation.deadline() - now),
                lock.escape_attempts()
            );
            if let Some(profile) = engine.current_prompt() {
                println!();
                println!("        {}", profile.text());
                for option in profile.options() {
                    println!("          [{option}]");
                }
            }
        }
        _ => println!("unlocked"),
    }

    println!();
    let pending = engine.get_pending_obligations();
    if pending.is_empty() {
        println!("no pending obligations");
    } else {
        println!("pending:");
        for obligation in pending {
            println!(
                "  #{:<4} {:<8} {:<8} {:<24} {:>5}/{:<5} due {} ({})",
                obligation.id(),
                obligation.kind().as_str(),
                obligation.status().as_str(),
                obligation.name().as_str(),
                obligation.units_completed(),
                obligation.units_required(),
                obligation.scheduled_at().format(TIME_FORMAT),
                format_duration(obligation.scheduled_at() - now)
            );
        }
    }
    if let Some(next) = engine.get_next_obligation() {
        println!("next:   #{} \"{}\"", next.id(), next.name());
    }

    let ledger = engine.ledger();
    println!();
    println!(
        "debt {:.2} units, {} failures, chronic delay {}, windows x{:.1}",
        ledger.debt_units(),
        ledger.failure_count(),
        if ledger.chronic_delay() { "ACTIVE" } else { "off" },
        ledger.compression_factor()
    );
}

/// Warn on stderr when the last save did not land.
pub fn report_sync(status: &SyncStatus) {
    if let SyncStatus::Unsynced {
        since,
        attempts,
        last_error,
    } = status
    {
        eprintln!(
            "warning: state not saved since {} ({attempts} attempts): {last_error}",
            since.format(TIME_FORMAT)
        );
    }
}

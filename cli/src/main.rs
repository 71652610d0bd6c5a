//! Vow CLI - binary entry point.
//!
//! # Architecture
//!
//! Every invocation opens the engine from the configured state file, catches
//! it up to the wall clock with one tick, runs the requested command, and
//! exits. The engine saves after each mutation, so there is nothing to flush
//! on the way out.
//!
//! ```text
//! main() -> Cli::parse() -> open_engine() -> batch { tick(now); command } -> print
//!                                    |
//!                                    v
//!                              `vow run`: TickDriver + interval heartbeat
//! ```
//!
//! Logs go to `~/.vow/logs/vow.log`; stdout carries only command output.

mod command;
mod output;

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::task;
use tokio::time::{self, MissedTickBehavior};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use vow_config::{ResolvedConfig, VowConfig};
use vow_core::{
    Clock, Engine, EngineError, EngineSettings, JsonFileStore, SystemClock, TickDriver,
};

use crate::command::{Cli, Command};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_vow_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay quiet rather than interleave logs with command output.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_vow_log_file() -> (Option<(PathBuf, File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in vow_log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn vow_log_file_candidates() -> Vec<PathBuf> {
    vec![
        // Primary: ~/.vow/logs/vow.log
        vow_config::vow_dir().join("logs").join("vow.log"),
        // Fallback: ./.vow/logs/vow.log
        PathBuf::from(".vow").join("logs").join("vow.log"),
    ]
}

fn load_config() -> Result<ResolvedConfig> {
    let config = VowConfig::load()?.unwrap_or_default();
    Ok(config.resolve()?)
}

fn open_engine(config: &ResolvedConfig) -> Result<Engine<JsonFileStore>> {
    let settings = EngineSettings::from_minutes(config.standard_window_minutes)?;
    let store = JsonFileStore::new(&config.state_path);
    Engine::open(store, settings, Arc::new(SystemClock)).with_context(|| {
        format!(
            "failed to open state at {}",
            config.state_path.display()
        )
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let command = cli.command;

    init_tracing();

    let config = load_config()?;
    let mut engine = open_engine(&config)?;

    if command == Command::Run {
        run(engine, &config).await;
        return Ok(ExitCode::SUCCESS);
    }

    let result = execute(&mut engine, command);
    output::report_sync(engine.sync_status());
    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            tracing::warn!("Command failed: {err}");
            eprintln!("error: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Catch up, run one command, and print what happened.
fn execute(engine: &mut Engine<JsonFileStore>, command: Command) -> Result<(), EngineError> {
    let now = engine.now();
    let events = engine.batch(|engine| {
        let mut events = engine.tick(now)?;
        match &command {
            Command::Add { kind, name, units, .. } => {
                let due_at = command.due_at(now).unwrap_or(now);
                let (id, created) = engine.create_obligation(*kind, name, *units, due_at)?;
                println!("created #{id}");
                events.extend(created);
                // A schedule of "now" binds immediately.
                events.extend(engine.tick(now)?);
            }
            Command::Log { id, units } => events.extend(engine.log_execution(*id, *units)?),
            Command::Escape => events.extend(engine.log_escape_attempt()?),
            Command::Delete { id } => events.extend(engine.delete_obligation(*id)?),
            Command::Tick
            | Command::Status
            | Command::Events { .. }
            | Command::Run => {}
        }
        Ok(events)
    })?;

    match command {
        Command::Status => output::print_status(engine, now),
        Command::Events { count } => output::print_log(engine.events().tail(count)),
        Command::Tick if events.is_empty() => println!("nothing changed"),
        _ => output::print_events(&events),
    }
    Ok(())
}

/// Heartbeat until Ctrl-C.
///
/// Each tick runs on the blocking pool. A tick that fires while the previous
/// one is still saving is refused by the driver and picked up by the next.
async fn run(engine: Engine<JsonFileStore>, config: &ResolvedConfig) {
    let driver = Arc::new(TickDriver::new(engine));
    let mut interval = time::interval(config.heartbeat_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_ms = config.heartbeat_interval.as_millis() as u64,
        state = %config.state_path.display(),
        "Heartbeat started"
    );
    println!(
        "vow running, ticking every {:?} (Ctrl-C to stop)",
        config.heartbeat_interval
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let driver = Arc::clone(&driver);
                let _detached = task::spawn_blocking(move || heartbeat(&driver));
            }
            result = signal::ctrl_c() => {
                if let Err(err) = result {
                    tracing::warn!("Failed to listen for Ctrl-C: {err}");
                }
                break;
            }
        }
    }

    tracing::info!("Heartbeat stopped");
    driver.with_engine(|engine| {
        if let Err(err) = engine.retry_sync() {
            tracing::warn!("Final save failed: {err}");
        }
        output::report_sync(engine.sync_status());
    });
}

fn heartbeat(driver: &TickDriver<JsonFileStore>) {
    let now = SystemClock.now();
    match driver.tick(now) {
        Ok(events) if events.is_empty() => {}
        Ok(events) => {
            output::print_events(&events);
            driver.with_engine(|engine| output::report_sync(engine.sync_status()));
        }
        Err(EngineError::Concurrency) => {
            tracing::debug!(%now, "Heartbeat skipped: tick in flight");
        }
        Err(err) => tracing::warn!("Heartbeat tick failed: {err}"),
    }
}

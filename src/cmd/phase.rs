//! Phase listing, status, and clear commands.

use anyhow::Result;
use console::style;
use std::path::Path;

use primer::audit::RunLogger;
use primer::dag::PhaseRegistry;
use primer::errors::{BatchError, ExitStatus};
use primer::init::is_initialized;
use primer::orchestrator::{PhaseStatus, StateLock, StateStore};
use primer::primer_config::PrimerConfig;
use primer::ui::format_duration;

use super::super::Cli;
use super::load_config;

fn not_initialized() -> ExitStatus {
    println!();
    println!("No phases found. Run 'primer init' first to initialize the project.");
    println!();
    ExitStatus::ConfigurationError
}

fn load_registry(config: &PrimerConfig) -> Result<PhaseRegistry, BatchError> {
    Ok(PhaseRegistry::load(&config.phases_file(), &config.toml)?)
}

pub fn cmd_list(project_dir: &Path) -> Result<ExitStatus, BatchError> {
    if !is_initialized(project_dir) {
        return Ok(not_initialized());
    }

    let config = load_config(project_dir, false, false)?;
    let registry = load_registry(&config)?;

    println!();
    println!("Phases loaded from: {}", config.phases_file().display());
    println!();
    println!("{:<20} {:<20} {:<8} Command", "Phase", "Depends on", "Timeout");
    println!(
        "{:<20} {:<20} {:<8} -------",
        "--------------------", "--------------------", "-------"
    );

    for phase in registry.phases() {
        let deps = if phase.depends_on.is_empty() {
            "-".to_string()
        } else {
            phase.depends_on.join(",")
        };
        let timeout = phase
            .timeout_secs
            .map(|s| format!("{}s", s))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<20} {:<20} {:<8} {}", phase.id, deps, timeout, phase.command);
        if !phase.name.is_empty() {
            println!("  {}", style(&phase.name).dim());
        }
    }
    println!();
    println!("{} phase(s)", registry.len());
    println!();
    Ok(ExitStatus::Success)
}

pub fn cmd_status(project_dir: &Path) -> Result<ExitStatus, BatchError> {
    if !is_initialized(project_dir) {
        return Ok(not_initialized());
    }

    let config = load_config(project_dir, false, false)?;
    let registry = load_registry(&config)?;
    let store = StateStore::open(config.state_file());

    println!();
    println!("Primer Status: {}", config.project_name());
    println!("==============");
    println!();

    let mut succeeded = 0;
    for phase in registry.phases() {
        let status = store.status(&phase.id);
        let label = match status {
            PhaseStatus::Succeeded => {
                succeeded += 1;
                style(status.to_string()).green()
            }
            PhaseStatus::Failed => style(status.to_string()).red(),
            PhaseStatus::NeverRun => style(status.to_string()).dim(),
        };

        match store.record(&phase.id) {
            Some(record) => {
                let changed = match &record.fingerprint {
                    Some(fp) if *fp != phase.fingerprint() => {
                        format!(" {}", style("(changed since last run)").yellow())
                    }
                    _ => String::new(),
                };
                println!(
                    "  {:<20} {:<10} {}  {}{}",
                    phase.id,
                    label,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.detail,
                    changed
                );
            }
            None => println!("  {:<20} {}", phase.id, label),
        }
    }

    // Records for phases that are no longer declared.
    for record in store.records() {
        if registry.get(&record.phase_id).is_none() {
            println!(
                "  {:<20} {:<10} {}",
                style(&record.phase_id).dim(),
                style(record.status.to_string()).dim(),
                style("(no longer declared)").dim()
            );
        }
    }

    println!();
    println!("{}/{} phases succeeded", succeeded, registry.len());

    let logger = RunLogger::new(&config.runs_dir());
    match logger.latest_run() {
        Ok(Some(run)) => {
            let state = run
                .state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unfinished".to_string());
            println!(
                "Last run: {} ({}, {} in {})",
                run.started_at.format("%Y-%m-%d %H:%M:%S"),
                run.short_id(),
                state,
                format_duration(run.elapsed)
            );
        }
        Ok(None) => println!("Last run: never"),
        Err(e) => tracing::warn!(error = %format!("{:#}", e), "Failed to read run logs"),
    }
    println!();
    Ok(ExitStatus::Success)
}

pub fn cmd_clear(
    project_dir: &Path,
    cli: &Cli,
    phase: Option<&str>,
    all: bool,
    force: bool,
) -> Result<ExitStatus, BatchError> {
    use dialoguer::Confirm;

    if !is_initialized(project_dir) {
        return Ok(not_initialized());
    }

    let config = load_config(project_dir, cli.verbose, false)?;

    let target = match (phase, all) {
        (Some(id), false) => Some(id),
        (None, true) => None,
        _ => {
            return Err(BatchError::Other(anyhow::anyhow!(
                "Specify a phase id or --all, not both"
            )));
        }
    };

    if target.is_none() && !force && !cli.yes {
        let confirm = Confirm::new()
            .with_prompt("This will clear every execution record. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Clear cancelled");
            return Ok(ExitStatus::Success);
        }
    }

    let lock_path = config.lock_file();
    let Some(_lock) = StateLock::try_acquire(&lock_path)? else {
        return Err(BatchError::Locked { path: lock_path });
    };

    let mut store = StateStore::open(config.state_file());
    match target {
        Some(id) => {
            if store.clear(id)? {
                println!("Cleared record for '{}'", id);
            } else {
                println!("No record for '{}'", id);
            }
        }
        None => {
            store.clear_all()?;
            println!("Cleared all execution records");
        }
    }
    Ok(ExitStatus::Success)
}

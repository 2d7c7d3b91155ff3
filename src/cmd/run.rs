//! Batch execution: `primer run`.

use std::path::Path;

use primer::audit::{RunConfig, RunLogger};
use primer::dag::{ForceRerun, PhaseRegistry};
use primer::errors::{BatchError, ConfigurationError, ExitStatus};
use primer::gates::default_gates;
use primer::init::is_initialized;
use primer::logging;
use primer::orchestrator::{
    BatchEvent, ExecutorOptions, PhaseExecutor, Sequencer, StateLock, StateStore,
};
use primer::tracker::GitTracker;
use primer::ui::{BatchUI, UiMode};
use tokio::sync::{mpsc, watch};

use super::super::Cli;
use super::load_config;

/// Flags accepted by `primer run`.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub phases: Vec<String>,
    pub dry_run: bool,
    pub force: bool,
    pub force_phases: Vec<String>,
    pub continue_on_failure: bool,
}

pub async fn cmd_run(cli: &Cli, project_dir: &Path, args: RunArgs) -> Result<ExitStatus, BatchError> {
    if !is_initialized(project_dir) {
        return Err(ConfigurationError::Declarations {
            path: project_dir.join(primer::init::PRIMER_DIR),
            message: "project not initialized, run 'primer init' first".to_string(),
        }
        .into());
    }

    let config = load_config(project_dir, cli.verbose, args.continue_on_failure)?;
    let log_guard = logging::init(&config.toml.logging, Some(&config.log_dir()), cli.verbose)?;
    if let Some(path) = log_guard.log_file() {
        tracing::debug!(path = %path.display(), "Writing log file");
    }

    let registry = PhaseRegistry::load(&config.phases_file(), &config.toml)?;

    // Dry runs never write, so they do not contend for the lock.
    let _lock = if args.dry_run {
        None
    } else {
        let lock_path = config.lock_file();
        match StateLock::try_acquire(&lock_path)? {
            Some(lock) => Some(lock),
            None => return Err(BatchError::Locked { path: lock_path }),
        }
    };

    let store = StateStore::open(config.state_file());

    let capture_dir = config
        .toml
        .defaults
        .capture_output
        .then(|| config.phase_log_dir());
    let sequencer = Sequencer::new(config.project_dir.clone(), config.shell()).capture_output(capture_dir);

    let options = ExecutorOptions {
        dry_run: args.dry_run,
        policy: config.failure_policy(),
        force: ForceRerun::from_flags(args.force, &args.force_phases),
    };

    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if *interrupt_tx.borrow() {
                tracing::warn!("Already stopping, waiting for the running phase to be killed");
            } else {
                tracing::warn!("Received interrupt, stopping batch");
                interrupt_tx.send(true).ok();
            }
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel::<BatchEvent>(64);
    let ui = BatchUI::new(UiMode::detect(), cli.verbose);
    let ui_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            ui.handle_event(&event);
        }
        ui
    });

    let mut executor = PhaseExecutor::new(registry, store, sequencer, options.clone())
        .with_preflight(default_gates(&config))
        .with_event_channel(event_tx)
        .with_interrupt(interrupt_rx);

    let mut run_logger = RunLogger::new(&config.runs_dir());
    if !args.dry_run {
        let head_sha = GitTracker::new(&config.project_dir)
            .ok()
            .and_then(|tracker| tracker.head_sha());
        run_logger.start_run(
            RunConfig {
                project_dir: config.project_dir.clone(),
                requested: args.phases.clone(),
                policy: options.policy,
                force_all: args.force,
                forced_phases: args.force_phases.clone(),
                shell: config.shell(),
            },
            head_sha,
        );
    }

    let outcome = executor.execute(&args.phases).await;
    // Closes the event channel so the UI task drains and exits.
    drop(executor);
    let ui = ui_task
        .await
        .map_err(|e| BatchError::Other(anyhow::anyhow!("UI task failed: {}", e)))?;

    let result = outcome?;

    if run_logger.current_run().is_some()
        && let Err(e) = run_logger.finish_run(&result)
    {
        tracing::warn!(error = %format!("{:#}", e), "Failed to write run log");
    }

    ui.print_summary(&result);
    Ok(result.exit_status())
}

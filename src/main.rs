use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use primer::errors::{BatchError, ConfigurationError, ExitStatus, PreflightError};

mod cmd;

#[derive(Parser)]
#[command(name = "primer")]
#[command(version, about = "Idempotent project bootstrap orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new primer project
    Init,
    /// Run all phases, or the named phases plus their dependencies
    Run {
        /// Phase ids to run; all phases when omitted
        phases: Vec<String>,
        /// Report the plan without running commands or writing state
        #[arg(long)]
        dry_run: bool,
        /// Re-run every planned phase even if it already succeeded
        #[arg(long)]
        force: bool,
        /// Re-run this phase even if it already succeeded (repeatable)
        #[arg(long = "force-phase", value_name = "ID")]
        force_phase: Vec<String>,
        /// Keep running independent phases after a failure
        #[arg(long)]
        continue_on_failure: bool,
    },
    /// List declared phases
    List,
    /// Show the recorded status of every phase
    Status,
    /// Clear execution records so phases run again
    Clear {
        /// Phase id whose record to clear
        phase: Option<String>,
        /// Clear every record
        #[arg(long)]
        all: bool,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate primer.toml and phases.json
    Validate,
    /// Create a default primer.toml
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(&cli).await {
        Ok(status) => status.into(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_status_for(&e).into()
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<ExitStatus, BatchError> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init => Ok(cmd::cmd_init(&project_dir)?),
        Commands::Run {
            phases,
            dry_run,
            force,
            force_phase,
            continue_on_failure,
        } => {
            let args = cmd::run::RunArgs {
                phases: phases.clone(),
                dry_run: *dry_run,
                force: *force,
                force_phases: force_phase.clone(),
                continue_on_failure: *continue_on_failure,
            };
            cmd::cmd_run(cli, &project_dir, args).await
        }
        Commands::List => cmd::cmd_list(&project_dir),
        Commands::Status => cmd::cmd_status(&project_dir),
        Commands::Clear { phase, all, force } => {
            cmd::cmd_clear(&project_dir, cli, phase.as_deref(), *all, *force)
        }
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone()),
    }
}

/// Map an error to an exit status, looking through `anyhow` context.
fn exit_status_for(err: &BatchError) -> ExitStatus {
    match err {
        BatchError::Other(inner) => {
            if inner.downcast_ref::<ConfigurationError>().is_some() {
                ExitStatus::ConfigurationError
            } else if inner.downcast_ref::<PreflightError>().is_some() {
                ExitStatus::PreflightFailed
            } else {
                ExitStatus::Internal
            }
        }
        other => other.exit_status(),
    }
}

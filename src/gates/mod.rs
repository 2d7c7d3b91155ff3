//! Pre-flight gates consulted before a batch starts.
//!
//! A gate either passes or returns a `PreflightError`; the first refusal aborts
//! the batch before any phase runs. Gates may log warnings and still pass.

use crate::errors::PreflightError;
use crate::primer_config::PrimerConfig;
use crate::tracker::GitTracker;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

#[async_trait]
pub trait PreflightCheck: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    async fn check(&self) -> Result<(), PreflightError>;
}

/// Refuses to run when the git working tree has uncommitted changes.
pub struct GitCleanGate {
    project_dir: PathBuf,
}

impl GitCleanGate {
    pub fn new(project_dir: PathBuf) -> Self {
        Self { project_dir }
    }
}

#[async_trait]
impl PreflightCheck for GitCleanGate {
    fn name(&self) -> &str {
        "git-clean"
    }

    async fn check(&self) -> Result<(), PreflightError> {
        if !GitTracker::is_repository(&self.project_dir) {
            tracing::warn!(
                project_dir = %self.project_dir.display(),
                "Not a git repository; skipping working tree check"
            );
            return Ok(());
        }

        let status = GitTracker::new(&self.project_dir)
            .and_then(|tracker| tracker.working_tree_status())
            .map_err(|e| PreflightError::Check {
                gate: self.name().to_string(),
                message: format!("{:#}", e),
            })?;

        if status.is_clean() {
            tracing::debug!("Working tree is clean");
            Ok(())
        } else {
            Err(PreflightError::DirtyWorkingTree {
                paths: status.dirty_paths,
            })
        }
    }
}

/// Checks configuration warnings, required files and the optional
/// `validate_command`.
pub struct ConfigValidationGate {
    project_dir: PathBuf,
    shell: String,
    warnings: Vec<String>,
    required_files: Vec<PathBuf>,
    validate_command: Option<String>,
}

impl ConfigValidationGate {
    pub fn from_config(config: &PrimerConfig) -> Self {
        Self {
            project_dir: config.project_dir.clone(),
            shell: config.shell(),
            warnings: config.validate(),
            required_files: config.toml.preflight.required_files.clone(),
            validate_command: config.toml.preflight.validate_command.clone(),
        }
    }

    async fn run_validate_command(&self, command: &str) -> Result<(), Vec<String>> {
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&self.project_dir)
            .env("PRIMER_PROJECT_DIR", &self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| vec![format!("Failed to run validate_command '{}': {}", command, e)])?;

        if output.status.success() {
            return Ok(());
        }

        let mut lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&output.stderr).lines())
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.to_string())
            .collect();
        if lines.is_empty() {
            lines.push(match output.status.code() {
                Some(code) => format!("validate_command exited with code {}", code),
                None => "validate_command was terminated by a signal".to_string(),
            });
        }
        Err(lines)
    }
}

#[async_trait]
impl PreflightCheck for ConfigValidationGate {
    fn name(&self) -> &str {
        "config"
    }

    async fn check(&self) -> Result<(), PreflightError> {
        let mut errors = self.warnings.clone();

        for file in &self.required_files {
            if !self.project_dir.join(file).exists() {
                errors.push(format!("Required file is missing: {}", file.display()));
            }
        }

        if let Some(command) = &self.validate_command {
            if let Err(lines) = self.run_validate_command(command).await {
                errors.extend(lines);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PreflightError::InvalidConfig { errors })
        }
    }
}

/// The gates enabled by the project's configuration.
pub fn default_gates(config: &PrimerConfig) -> Vec<Box<dyn PreflightCheck>> {
    let mut gates: Vec<Box<dyn PreflightCheck>> = Vec::new();
    if config.toml.preflight.require_clean_git {
        gates.push(Box::new(GitCleanGate::new(config.project_dir.clone())));
    }
    gates.push(Box::new(ConfigValidationGate::from_config(config)));
    gates
}

/// Run gates in order and stop at the first refusal.
pub async fn run_preflight(gates: &[Box<dyn PreflightCheck>]) -> Result<(), PreflightError> {
    for gate in gates {
        tracing::debug!(gate = gate.name(), "Running pre-flight check");
        if let Err(e) = gate.check().await {
            tracing::error!(gate = gate.name(), error = %e, "Pre-flight check failed");
            return Err(e);
        }
    }
    Ok(())
}

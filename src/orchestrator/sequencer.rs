//! Runs one phase and judges its outcome.
//!
//! The command runs through `<shell> -c` in its own process group. When it
//! exits zero and the phase declares `verify`, the verification command runs
//! next under the same bound. The judgment is the only thing the executor
//! sees; persistence happens there.

use crate::errors::PhaseExecutionError;
use crate::orchestrator::process::ProcessGroupGuard;
use crate::phase::Phase;
use std::fs::{File, OpenOptions};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::watch;

/// Outcome of running a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Judgment {
    Succeeded { detail: String },
    Failed(PhaseExecutionError),
    /// An interrupt arrived while the phase was running
    Interrupted,
}

impl Judgment {
    pub fn is_success(&self) -> bool {
        matches!(self, Judgment::Succeeded { .. })
    }
}

enum StepOutcome {
    Exited(ExitStatus),
    TimedOut,
    Interrupted,
    Failed(String),
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct Sequencer {
    project_dir: PathBuf,
    shell: String,
    dry_run: bool,
    capture_dir: Option<PathBuf>,
    interrupt: Option<watch::Receiver<bool>>,
}

impl Sequencer {
    pub fn new(project_dir: PathBuf, shell: impl Into<String>) -> Self {
        Self {
            project_dir,
            shell: shell.into(),
            dry_run: false,
            capture_dir: None,
            interrupt: None,
        }
    }

    /// Judge every phase successful without executing anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Send phase output to `<dir>/<id>.log` instead of inheriting the terminal.
    pub fn capture_output(mut self, dir: Option<PathBuf>) -> Self {
        self.capture_dir = dir;
        self
    }

    pub fn with_interrupt(mut self, rx: watch::Receiver<bool>) -> Self {
        self.interrupt = Some(rx);
        self
    }

    pub async fn run_and_judge(&self, phase: &Phase) -> Judgment {
        if self.dry_run {
            tracing::info!(phase = %phase.id, command = %phase.command, "Dry run: would execute");
            return Judgment::Succeeded {
                detail: "dry-run".to_string(),
            };
        }

        let log = match self.open_log(phase) {
            Ok(log) => log,
            Err(e) => {
                return Judgment::Failed(PhaseExecutionError::SpawnFailed {
                    message: format!("failed to open phase log: {}", e),
                });
            }
        };

        tracing::debug!(phase = %phase.id, command = %phase.command, "Running phase command");
        match self.run_step(phase, &phase.command, log.as_ref()).await {
            StepOutcome::Exited(status) if status.success() => {}
            other => return self.judge_failure(phase, other, false),
        }

        let Some(verify) = &phase.verify else {
            return Judgment::Succeeded {
                detail: "exit code 0".to_string(),
            };
        };

        tracing::debug!(phase = %phase.id, verify = %verify, "Running verification");
        match self.run_step(phase, verify, log.as_ref()).await {
            StepOutcome::Exited(status) if status.success() => Judgment::Succeeded {
                detail: "exit code 0, verified".to_string(),
            },
            other => self.judge_failure(phase, other, true),
        }
    }

    fn judge_failure(&self, phase: &Phase, outcome: StepOutcome, verifying: bool) -> Judgment {
        let error = match outcome {
            StepOutcome::Interrupted => return Judgment::Interrupted,
            StepOutcome::TimedOut => PhaseExecutionError::Timeout {
                secs: phase.timeout_secs.unwrap_or_default(),
            },
            StepOutcome::Failed(message) => PhaseExecutionError::SpawnFailed { message },
            StepOutcome::Exited(status) if verifying => PhaseExecutionError::VerificationFailed {
                code: status.code(),
            },
            StepOutcome::Exited(status) => match (status.code(), status.signal()) {
                (Some(code), _) => PhaseExecutionError::NonZeroExit { code },
                (None, Some(signal)) => PhaseExecutionError::Signaled { signal },
                (None, None) => PhaseExecutionError::NonZeroExit { code: -1 },
            },
        };
        Judgment::Failed(error)
    }

    fn working_dir(&self, phase: &Phase) -> PathBuf {
        match &phase.working_dir {
            Some(dir) => self.project_dir.join(dir),
            None => self.project_dir.clone(),
        }
    }

    fn open_log(&self, phase: &Phase) -> std::io::Result<Option<File>> {
        let Some(dir) = &self.capture_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(phase_log_path(dir, &phase.id))?;
        Ok(Some(file))
    }

    async fn run_step(&self, phase: &Phase, script: &str, log: Option<&File>) -> StepOutcome {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(script)
            .current_dir(self.working_dir(phase))
            .env("PRIMER_PHASE", &phase.id)
            .env("PRIMER_PROJECT_DIR", &self.project_dir)
            .stdin(Stdio::null())
            .process_group(0)
            .kill_on_drop(true);

        if let Some(file) = log {
            match (file.try_clone(), file.try_clone()) {
                (Ok(out), Ok(err)) => {
                    cmd.stdout(Stdio::from(out)).stderr(Stdio::from(err));
                }
                (Err(e), _) | (_, Err(e)) => {
                    return StepOutcome::Failed(format!("failed to open phase log: {}", e));
                }
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(phase = %phase.id, shell = %self.shell, error = %e, "Failed to spawn phase command");
                return StepOutcome::Failed(e.to_string());
            }
        };
        let mut guard = child.id().map(ProcessGroupGuard::new);

        let waited = tokio::select! {
            waited = wait_with_timeout(&mut child, phase.timeout()) => Some(waited),
            _ = interrupted(self.interrupt.clone()) => None,
        };

        match waited {
            Some(Waited::Exited(Ok(status))) => {
                if let Some(guard) = guard.as_mut() {
                    guard.disarm();
                }
                StepOutcome::Exited(status)
            }
            Some(Waited::Exited(Err(e))) => {
                reap(&mut child, guard.as_mut()).await;
                StepOutcome::Failed(e.to_string())
            }
            Some(Waited::TimedOut) => {
                tracing::warn!(phase = %phase.id, timeout_secs = ?phase.timeout_secs, "Phase timed out; killing process group");
                reap(&mut child, guard.as_mut()).await;
                StepOutcome::TimedOut
            }
            None => {
                tracing::warn!(phase = %phase.id, "Interrupted; killing process group");
                reap(&mut child, guard.as_mut()).await;
                StepOutcome::Interrupted
            }
        }
    }
}

async fn wait_with_timeout(child: &mut Child, limit: Option<Duration>) -> Waited {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(result) => Waited::Exited(result),
            Err(_) => Waited::TimedOut,
        },
        None => Waited::Exited(child.wait().await),
    }
}

/// Resolves once the interrupt flag is set. Never resolves without a receiver.
async fn interrupted(rx: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = rx
        && rx.wait_for(|flag| *flag).await.is_ok()
    {
        return;
    }
    std::future::pending::<()>().await
}

async fn reap(child: &mut Child, guard: Option<&mut ProcessGroupGuard>) {
    match guard {
        Some(guard) => guard.kill(),
        None => {
            let _ = child.start_kill();
        }
    }
    let _ = child.wait().await;
}

/// Where captured output for a phase is written.
pub fn phase_log_path(dir: &Path, phase_id: &str) -> PathBuf {
    dir.join(format!("{}.log", phase_id))
}

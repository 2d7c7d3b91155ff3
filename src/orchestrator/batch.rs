//! Batch outcome types.
//!
//! A batch is one `primer run` invocation. Its result lists what happened to
//! every planned phase and maps to the process exit status.

use crate::errors::{ExitStatus, PhaseExecutionError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Terminal state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Every planned phase was handled; some may have failed under `continue`
    Completed,
    /// A failure stopped the batch under `fail-fast`
    Aborted,
    /// Ctrl-C stopped the batch
    Interrupted,
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchState::Completed => write!(f, "completed"),
            BatchState::Aborted => write!(f, "aborted"),
            BatchState::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// What happened to one planned phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Skipped,
    Failed,
    NotAttempted,
    Interrupted,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Succeeded => write!(f, "succeeded"),
            OutcomeStatus::Skipped => write!(f, "skipped"),
            OutcomeStatus::Failed => write!(f, "failed"),
            OutcomeStatus::NotAttempted => write!(f, "not_attempted"),
            OutcomeStatus::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    pub phase: String,
    pub status: OutcomeStatus,
    #[serde(default)]
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PhaseErrorKind>,
    #[serde(with = "duration_serde", default)]
    pub duration: Duration,
}

/// Serializable classification of a phase failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseErrorKind {
    NonZeroExit,
    VerificationFailed,
    Timeout,
    Signaled,
    SpawnFailed,
}

impl From<&PhaseExecutionError> for PhaseErrorKind {
    fn from(err: &PhaseExecutionError) -> Self {
        match err {
            PhaseExecutionError::NonZeroExit { .. } => PhaseErrorKind::NonZeroExit,
            PhaseExecutionError::VerificationFailed { .. } => PhaseErrorKind::VerificationFailed,
            PhaseExecutionError::Timeout { .. } => PhaseErrorKind::Timeout,
            PhaseExecutionError::Signaled { .. } => PhaseErrorKind::Signaled,
            PhaseExecutionError::SpawnFailed { .. } => PhaseErrorKind::SpawnFailed,
        }
    }
}

impl PhaseOutcome {
    pub fn succeeded(phase: &str, detail: &str, duration: Duration) -> Self {
        Self {
            phase: phase.to_string(),
            status: OutcomeStatus::Succeeded,
            detail: detail.to_string(),
            error: None,
            duration,
        }
    }

    pub fn skipped(phase: &str) -> Self {
        Self {
            phase: phase.to_string(),
            status: OutcomeStatus::Skipped,
            detail: "already succeeded".to_string(),
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn failed(phase: &str, error: &PhaseExecutionError, duration: Duration) -> Self {
        Self {
            phase: phase.to_string(),
            status: OutcomeStatus::Failed,
            detail: error.to_string(),
            error: Some(error.into()),
            duration,
        }
    }

    pub fn not_attempted(phase: &str, reason: &str) -> Self {
        Self {
            phase: phase.to_string(),
            status: OutcomeStatus::NotAttempted,
            detail: reason.to_string(),
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn interrupted(phase: &str, duration: Duration) -> Self {
        Self {
            phase: phase.to_string(),
            status: OutcomeStatus::Interrupted,
            detail: "interrupted".to_string(),
            error: None,
            duration,
        }
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub state: BatchState,
    pub dry_run: bool,
    /// One entry per planned phase, in plan order
    pub outcomes: Vec<PhaseOutcome>,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

impl BatchResult {
    pub fn new(state: BatchState, dry_run: bool, outcomes: Vec<PhaseOutcome>, elapsed: Duration) -> Self {
        Self {
            state,
            dry_run,
            outcomes,
            elapsed,
        }
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.ids_with(OutcomeStatus::Succeeded)
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.ids_with(OutcomeStatus::Skipped)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.ids_with(OutcomeStatus::Failed)
    }

    pub fn not_attempted(&self) -> Vec<&str> {
        self.ids_with(OutcomeStatus::NotAttempted)
    }

    /// The first phase that failed, in plan order.
    pub fn first_failure(&self) -> Option<&PhaseOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.status == OutcomeStatus::Failed)
    }

    pub fn outcome(&self, phase: &str) -> Option<&PhaseOutcome> {
        self.outcomes.iter().find(|o| o.phase == phase)
    }

    /// Number of phases the sequencer was invoked for.
    pub fn executed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.status,
                    OutcomeStatus::Succeeded | OutcomeStatus::Failed | OutcomeStatus::Interrupted
                )
            })
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.state == BatchState::Completed && self.first_failure().is_none()
    }

    pub fn exit_status(&self) -> ExitStatus {
        match self.state {
            BatchState::Interrupted => ExitStatus::Interrupted,
            _ if self.first_failure().is_some() => ExitStatus::PhaseFailed,
            _ => ExitStatus::Success,
        }
    }

    fn ids_with(&self, status: OutcomeStatus) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.status == status)
            .map(|o| o.phase.as_str())
            .collect()
    }
}

/// Tracks execution timing.
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Durations serialize as whole milliseconds.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

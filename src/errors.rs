//! Typed error hierarchy for the primer orchestrator.
//!
//! Four enums cover the failure classes of a batch:
//! - `ConfigurationError`: bad phase declarations or requests, fatal before any phase runs
//! - `PreflightError`: a pre-flight gate refused the batch, zero phases run
//! - `PhaseExecutionError`: a single phase failed; local to that phase
//! - `BatchError`: anything that stops a batch before it starts, mapped to an exit status
//!
//! Unreadable state files are not errors at all: the state store logs a warning and
//! treats the store as empty.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid phase declarations or an invalid run request.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Unknown phase '{id}'")]
    UnknownPhase { id: String },

    #[error("Duplicate phase id '{id}'")]
    DuplicatePhase { id: String },

    #[error("Phase '{phase}' depends on unknown phase '{dependency}'")]
    UnknownDependency { phase: String, dependency: String },

    #[error("Phase '{phase}' depends on itself")]
    SelfDependency { phase: String },

    #[error("Invalid phase id '{id}': ids must match [A-Za-z0-9][A-Za-z0-9_.-]*")]
    InvalidPhaseId { id: String },

    #[error("Dependency cycle detected: {}", .members.join(" -> "))]
    Cycle { members: Vec<String> },

    #[error("Failed to load phase declarations from {path}: {message}")]
    Declarations { path: PathBuf, message: String },
}

/// A pre-flight gate refused to start the batch.
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("Working tree is not clean ({} changed path(s)): {}", .paths.len(), .paths.join(", "))]
    DirtyWorkingTree { paths: Vec<String> },

    #[error("Configuration is invalid:\n{}", .errors.join("\n"))]
    InvalidConfig { errors: Vec<String> },

    #[error("Pre-flight check '{gate}' failed: {message}")]
    Check { gate: String, message: String },
}

/// Why a single phase was judged failed.
///
/// The `Display` form is the short detail string persisted in the state store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseExecutionError {
    #[error("exit code {code}")]
    NonZeroExit { code: i32 },

    #[error("verification failed")]
    VerificationFailed { code: Option<i32> },

    #[error("timeout")]
    Timeout { secs: u64 },

    #[error("terminated by signal {signal}")]
    Signaled { signal: i32 },

    #[error("failed to spawn: {message}")]
    SpawnFailed { message: String },
}

impl PhaseExecutionError {
    /// Whether this failure was caused by the phase timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Failures that prevent a batch from running at all.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Preflight(#[from] PreflightError),

    #[error("State is locked by another primer process ({path})")]
    Locked { path: PathBuf },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BatchError {
    /// The process exit status this error maps to.
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            BatchError::Configuration(_) => ExitStatus::ConfigurationError,
            BatchError::Preflight(_) => ExitStatus::PreflightFailed,
            BatchError::Locked { .. } => ExitStatus::Locked,
            BatchError::Other(_) => ExitStatus::Internal,
        }
    }
}

/// Process exit codes reported by the `primer` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    PhaseFailed,
    PreflightFailed,
    ConfigurationError,
    Locked,
    Internal,
    Interrupted,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::PhaseFailed => 1,
            ExitStatus::PreflightFailed => 3,
            ExitStatus::ConfigurationError => 4,
            ExitStatus::Locked => 5,
            ExitStatus::Internal => 70,
            ExitStatus::Interrupted => 130,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}

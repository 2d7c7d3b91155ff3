//! Per-batch run logs under `.primer/runs/`.
//!
//! Every non-dry-run batch that gets past its pre-flight gates writes one JSON file
//! naming what was requested, with which options, and what happened to each
//! planned phase.

mod logger;

pub use logger::RunLogger;

use crate::orchestrator::batch::{BatchResult, BatchState, PhaseOutcome, duration_serde};
use crate::primer_config::FailurePolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub config: RunConfig,
    /// HEAD at the start of the run, when the project is a git repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<BatchState>,
    #[serde(default)]
    pub phases: Vec<PhaseOutcome>,
    #[serde(with = "duration_serde", default)]
    pub elapsed: Duration,
}

impl RunLog {
    pub fn new(config: RunConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            config,
            head_sha: None,
            state: None,
            phases: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Copy the batch outcome into the log and stamp the end time.
    pub fn finish(&mut self, result: &BatchResult) {
        self.ended_at = Some(Utc::now());
        self.state = Some(result.state);
        self.phases = result.outcomes.clone();
        self.elapsed = result.elapsed;
    }

    pub fn short_id(&self) -> String {
        self.run_id.to_string()[..8].to_string()
    }
}

/// The options a batch ran with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub project_dir: PathBuf,
    /// Phase ids named on the command line; empty means all
    #[serde(default)]
    pub requested: Vec<String>,
    pub policy: FailurePolicy,
    #[serde(default)]
    pub force_all: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forced_phases: Vec<String>,
    pub shell: String,
}

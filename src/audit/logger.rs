use super::{RunConfig, RunLog};
use crate::orchestrator::batch::BatchResult;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct RunLogger {
    runs_dir: PathBuf,
    current_run: Option<RunLog>,
}

impl RunLogger {
    pub fn new(runs_dir: &Path) -> Self {
        Self {
            runs_dir: runs_dir.to_path_buf(),
            current_run: None,
        }
    }

    pub fn start_run(&mut self, config: RunConfig, head_sha: Option<String>) {
        let mut run = RunLog::new(config);
        run.head_sha = head_sha;
        tracing::debug!(run_id = %run.run_id, "Started run log");
        self.current_run = Some(run);
    }

    pub fn current_run(&self) -> Option<&RunLog> {
        self.current_run.as_ref()
    }

    /// Record the batch outcome and write `<timestamp>_<run-id>.json`.
    pub fn finish_run(&mut self, result: &BatchResult) -> Result<PathBuf> {
        let mut run = self
            .current_run
            .take()
            .ok_or_else(|| anyhow::anyhow!("No current run to finish"))?;

        run.finish(result);

        let filename = format!(
            "{}_{}.json",
            run.started_at.format("%Y-%m-%dT%H-%M-%S"),
            run.short_id()
        );
        fs::create_dir_all(&self.runs_dir).with_context(|| {
            format!("Failed to create runs directory: {}", self.runs_dir.display())
        })?;
        let run_file = self.runs_dir.join(&filename);

        let json = serde_json::to_string_pretty(&run).context("Failed to serialize run log")?;
        fs::write(&run_file, json).context("Failed to write run log file")?;

        tracing::info!(path = %run_file.display(), "Wrote run log");
        Ok(run_file)
    }

    /// Run log files, most recent first.
    pub fn list_runs(&self) -> Result<Vec<PathBuf>> {
        if !self.runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<PathBuf> = fs::read_dir(&self.runs_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();

        runs.sort();
        runs.reverse();
        Ok(runs)
    }

    pub fn load_run(&self, path: &Path) -> Result<RunLog> {
        let content = fs::read_to_string(path).context("Failed to read run log file")?;
        let run: RunLog = serde_json::from_str(&content).context("Failed to parse run log file")?;
        Ok(run)
    }

    /// The most recent readable run log, if any.
    pub fn latest_run(&self) -> Result<Option<RunLog>> {
        for path in self.list_runs()? {
            match self.load_run(&path) {
                Ok(run) => return Ok(Some(run)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "Skipping unreadable run log")
                }
            }
        }
        Ok(None)
    }
}

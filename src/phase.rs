//! Phase declarations and JSON loading.
//!
//! This module provides:
//! - `Phase` struct representing a single bootstrap phase
//! - `PhasesFile` struct representing the `.primer/phases.json` format
//! - Loading and saving functions for the declaration file
//! - The template phases written by `primer init`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A named unit of bootstrap work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    /// Stable identifier, used as the state key
    pub id: String,
    /// Human-readable label
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Shell command that performs the work
    pub command: String,
    /// Phase ids that must have succeeded before this one runs
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Wall-clock bound for `command` (and separately for `verify`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Secondary check run after `command` exits zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
    /// Working directory, relative to the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Phase {
    /// Create a phase with a command and dependencies.
    pub fn new(id: &str, command: &str, depends_on: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            command: command.to_string(),
            depends_on,
            timeout_secs: None,
            verify: None,
            working_dir: None,
        }
    }

    /// Set the human-readable name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the timeout in seconds.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set the verification command.
    pub fn with_verify(mut self, verify: &str) -> Self {
        self.verify = Some(verify.to_string());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// SHA-256 over the parts of the declaration that change what the phase does.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.command.as_bytes());
        hasher.update([0u8]);
        if let Some(verify) = &self.verify {
            hasher.update(verify.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// The `.primer/phases.json` file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhasesFile {
    /// Phases in declaration order
    #[serde(default)]
    pub phases: Vec<Phase>,
}

impl PhasesFile {
    /// Load phases from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read phases file: {}", path.display()))?;

        let phases_file: PhasesFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse phases JSON: {}", path.display()))?;

        Ok(phases_file)
    }

    /// Save phases to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize phases to JSON")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write phases file: {}", path.display()))?;

        Ok(())
    }
}

/// Phases written by `primer init` as a starting point.
pub fn template_phases() -> Vec<Phase> {
    vec![
        Phase::new("install", "echo 'install dependencies here'", vec![])
            .with_name("Install dependencies")
            .with_timeout_secs(600),
        Phase::new("configure", "echo 'seed configuration here'", vec!["install".into()])
            .with_name("Seed configuration"),
        Phase::new("verify", "echo 'check the setup here'", vec!["configure".into()])
            .with_name("Verify setup")
            .with_verify("true"),
    ]
}

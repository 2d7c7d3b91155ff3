//! Unified configuration for primer.
//!
//! This module reads `.primer/primer.toml`. It supports:
//! - Project-level settings with sensible defaults
//! - Phase-specific timeout overrides using glob patterns
//! - Layered configuration (file → environment → CLI)
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-app"
//! shell = "bash"
//!
//! [defaults]
//! timeout_secs = 900
//! failure_policy = "fail-fast"
//! capture_output = false
//!
//! [preflight]
//! require_clean_git = true
//! validate_command = "./scripts/check-env.sh"
//! required_files = [".env.example"]
//!
//! [phases.overrides."db-*"]
//! timeout_secs = 120
//!
//! [logging]
//! level = "info"
//! format = "plain"
//! file = true
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::init::PRIMER_DIR;

/// What the executor does after a phase fails.
///
/// | Policy      | Behaviour                                                  |
/// |-------------|------------------------------------------------------------|
/// | `FailFast`  | Abort the batch; remaining phases are reported not attempted |
/// | `Continue`  | Keep running phases that do not depend on a failed phase    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    FailFast,
    Continue,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail-fast"),
            FailurePolicy::Continue => write!(f, "continue"),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail-fast" | "fail_fast" => Ok(FailurePolicy::FailFast),
            "continue" => Ok(FailurePolicy::Continue),
            _ => anyhow::bail!(
                "Invalid failure policy '{}'. Valid values: fail-fast, continue",
                s
            ),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Plain => write!(f, "plain"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Project-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (optional, defaults to directory name)
    #[serde(default)]
    pub name: Option<String>,
    /// Shell used to run phase commands (default: "sh")
    #[serde(default)]
    pub shell: Option<String>,
}

/// Default settings for all phases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Timeout applied to phases that declare none
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Policy after a phase failure
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Write phase output to `.primer/logs/phases/<id>.log` instead of the terminal
    #[serde(default)]
    pub capture_output: bool,
}

/// Pre-flight checks consulted before a batch starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightConfig {
    /// Refuse to run when the git working tree has uncommitted changes
    #[serde(default = "default_require_clean_git")]
    pub require_clean_git: bool,
    /// Command that validates project configuration; non-zero exit aborts the batch
    #[serde(default)]
    pub validate_command: Option<String>,
    /// Files that must exist, relative to the project root
    #[serde(default)]
    pub required_files: Vec<PathBuf>,
}

fn default_require_clean_git() -> bool {
    true
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            require_clean_git: default_require_clean_git(),
            validate_command: None,
            required_files: Vec::new(),
        }
    }
}

/// Phase-specific override settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseOverride {
    /// Timeout for matching phases that declare none
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Phase override configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhasesConfig {
    /// Pattern-based overrides (e.g., "db-*" -> PhaseOverride), applied in key order
    #[serde(default)]
    pub overrides: BTreeMap<String, PhaseOverride>,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format for the log file
    #[serde(default)]
    pub format: LogFormat,
    /// Write logs to `.primer/logs/primer.log`
    #[serde(default = "default_log_file")]
    pub file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: default_log_file(),
        }
    }
}

/// The complete primer.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrimerToml {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub preflight: PreflightConfig,
    #[serde(default)]
    pub phases: PhasesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PrimerToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse primer.toml")
    }

    /// Load configuration from `<primer_dir>/primer.toml`.
    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default(primer_dir: &Path) -> Result<Self> {
        let config_path = primer_dir.join("primer.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize primer.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Get the shell, with fallback to the `PRIMER_SHELL` environment variable.
    pub fn shell(&self) -> String {
        self.project
            .shell
            .clone()
            .or_else(|| std::env::var("PRIMER_SHELL").ok())
            .unwrap_or_else(|| "sh".to_string())
    }

    /// Timeout for a phase that declares none: the last matching override wins,
    /// then `[defaults] timeout_secs`.
    pub fn timeout_for(&self, phase_id: &str) -> Option<u64> {
        self.phases
            .overrides
            .iter()
            .filter(|(pattern, _)| pattern_matches(pattern, phase_id))
            .filter_map(|(_, o)| o.timeout_secs)
            .next_back()
            .or(self.defaults.timeout_secs)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.defaults.timeout_secs == Some(0) {
            warnings.push("[defaults] timeout_secs must be greater than 0".to_string());
        }

        for (pattern, override_cfg) in &self.phases.overrides {
            if glob::Pattern::new(pattern).is_err() {
                warnings.push(format!("Invalid override pattern '{}'", pattern));
            }
            if override_cfg.timeout_secs == Some(0) {
                warnings.push(format!(
                    "timeout_secs must be greater than 0 in override for pattern '{}'",
                    pattern
                ));
            }
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            warnings.push(format!(
                "Invalid logging level '{}': expected trace, debug, info, warn or error",
                self.logging.level
            ));
        }

        if matches!(&self.preflight.validate_command, Some(cmd) if cmd.trim().is_empty()) {
            warnings.push("[preflight] validate_command is empty".to_string());
        }

        warnings
    }
}

/// Check if a glob pattern matches a phase id (case-insensitive).
pub fn pattern_matches(pattern: &str, id: &str) -> bool {
    glob::Pattern::new(&pattern.to_lowercase())
        .map(|p| p.matches(&id.to_lowercase()))
        .unwrap_or(false)
}

/// Configuration that combines PrimerToml with CLI settings.
///
/// Merges settings from:
/// 1. primer.toml file
/// 2. Environment variables
/// 3. CLI arguments
#[derive(Debug, Clone)]
pub struct PrimerConfig {
    /// Path to the project directory
    pub project_dir: PathBuf,
    /// Path to the .primer directory
    pub primer_dir: PathBuf,
    /// Parsed primer.toml configuration
    pub toml: PrimerToml,
    /// CLI override: verbose mode
    pub verbose: bool,
    /// CLI override: continue past failures
    pub cli_continue_on_failure: bool,
}

impl PrimerConfig {
    /// Create a new PrimerConfig from a project directory.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let primer_dir = project_dir.join(PRIMER_DIR);
        let toml = PrimerToml::load_or_default(&primer_dir)?;

        Ok(Self {
            project_dir,
            primer_dir,
            toml,
            verbose: false,
            cli_continue_on_failure: false,
        })
    }

    /// Create PrimerConfig with CLI overrides.
    pub fn with_cli_args(
        project_dir: PathBuf,
        verbose: bool,
        continue_on_failure: bool,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        config.cli_continue_on_failure = continue_on_failure;
        Ok(config)
    }

    /// Failure policy (CLI → file → default).
    pub fn failure_policy(&self) -> FailurePolicy {
        if self.cli_continue_on_failure {
            FailurePolicy::Continue
        } else {
            self.toml.defaults.failure_policy
        }
    }

    /// Shell (file → env → default).
    pub fn shell(&self) -> String {
        self.toml.shell()
    }

    pub fn project_name(&self) -> String {
        self.toml.project.name.clone().unwrap_or_else(|| {
            self.project_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "project".to_string())
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.primer_dir.join("primer.toml")
    }

    pub fn phases_file(&self) -> PathBuf {
        self.primer_dir.join("phases.json")
    }

    pub fn state_file(&self) -> PathBuf {
        self.primer_dir.join("state.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.primer_dir.join("state.lock")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.primer_dir.join("runs")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.primer_dir.join("logs")
    }

    pub fn phase_log_dir(&self) -> PathBuf {
        self.log_dir().join("phases")
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_failure_policy_display_and_parse() {
        assert_eq!(FailurePolicy::FailFast.to_string(), "fail-fast");
        assert_eq!(FailurePolicy::Continue.to_string(), "continue");
        assert_eq!(
            "FAIL-FAST".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::FailFast
        );
        assert_eq!(
            "continue".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::Continue
        );
        assert!(
            "sometimes"
                .parse::<FailurePolicy>()
                .unwrap_err()
                .to_string()
                .contains("Invalid failure policy")
        );
    }

    #[test]
    fn test_failure_policy_default_is_fail_fast() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::FailFast);
    }

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("db-*", "db-migrate"));
        assert!(pattern_matches("DB-*", "db-seed"));
        assert!(!pattern_matches("db-*", "install"));
        assert!(pattern_matches("step-0?", "step-01"));
        assert!(!pattern_matches("step-0?", "step-10"));
        assert!(pattern_matches("*", "anything"));
    }

    #[test]
    fn test_primer_toml_parse_empty() {
        let toml = PrimerToml::parse("").unwrap();
        assert_eq!(toml.defaults.timeout_secs, None);
        assert_eq!(toml.defaults.failure_policy, FailurePolicy::FailFast);
        assert!(!toml.defaults.capture_output);
        assert!(toml.preflight.require_clean_git);
        assert_eq!(toml.logging.level, "info");
        assert_eq!(toml.logging.format, LogFormat::Plain);
        assert!(toml.logging.file);
    }

    #[test]
    fn test_primer_toml_parse_full() {
        let content = r#"
[project]
name = "my-app"
shell = "bash"

[defaults]
timeout_secs = 900
failure_policy = "continue"
capture_output = true

[preflight]
require_clean_git = false
validate_command = "./check.sh"
required_files = [".env.example"]

[logging]
level = "debug"
format = "json"
file = false
"#;
        let toml = PrimerToml::parse(content).unwrap();
        assert_eq!(toml.project.name.as_deref(), Some("my-app"));
        assert_eq!(toml.shell(), "bash");
        assert_eq!(toml.defaults.timeout_secs, Some(900));
        assert_eq!(toml.defaults.failure_policy, FailurePolicy::Continue);
        assert!(toml.defaults.capture_output);
        assert!(!toml.preflight.require_clean_git);
        assert_eq!(toml.preflight.validate_command.as_deref(), Some("./check.sh"));
        assert_eq!(
            toml.preflight.required_files,
            vec![PathBuf::from(".env.example")]
        );
        assert_eq!(toml.logging.format, LogFormat::Json);
        assert!(!toml.logging.file);
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_primer_toml_parse_invalid() {
        let err = PrimerToml::parse("[defaults]\ntimeout_secs = \"soon\"").unwrap_err();
        assert!(err.to_string().contains("Failed to parse primer.toml"));
    }

    #[test]
    fn test_timeout_for_uses_overrides_then_defaults() {
        let content = r#"
[defaults]
timeout_secs = 600

[phases.overrides."db-*"]
timeout_secs = 120

[phases.overrides."db-seed"]
timeout_secs = 30
"#;
        let toml = PrimerToml::parse(content).unwrap();
        assert_eq!(toml.timeout_for("install"), Some(600));
        assert_eq!(toml.timeout_for("db-migrate"), Some(120));
        // "db-seed" sorts after "db-*" and wins
        assert_eq!(toml.timeout_for("db-seed"), Some(30));
    }

    #[test]
    fn test_timeout_for_without_defaults() {
        let toml = PrimerToml::default();
        assert_eq!(toml.timeout_for("anything"), None);
    }

    #[test]
    fn test_validate_reports_warnings() {
        let content = r#"
[defaults]
timeout_secs = 0

[phases.overrides."db-*"]
timeout_secs = 0

[preflight]
validate_command = "  "

[logging]
level = "loud"
"#;
        let toml = PrimerToml::parse(content).unwrap();
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 4);
        assert!(warnings.iter().any(|w| w.contains("db-*")));
        assert!(warnings.iter().any(|w| w.contains("loud")));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("primer.toml");
        let mut toml = PrimerToml::default();
        toml.defaults.timeout_secs = Some(42);
        toml.save(&path).unwrap();

        let loaded = PrimerToml::load(&path).unwrap();
        assert_eq!(loaded.defaults.timeout_secs, Some(42));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let toml = PrimerToml::load_or_default(dir.path()).unwrap();
        assert!(toml.preflight.require_clean_git);
    }

    #[test]
    fn test_primer_config_paths_and_policy() {
        let dir = tempdir().unwrap();
        let config = PrimerConfig::with_cli_args(dir.path().to_path_buf(), true, true).unwrap();
        let root = dir.path().canonicalize().unwrap();

        assert_eq!(config.primer_dir, root.join(".primer"));
        assert_eq!(config.state_file(), root.join(".primer/state.json"));
        assert_eq!(config.phases_file(), root.join(".primer/phases.json"));
        assert_eq!(config.lock_file(), root.join(".primer/state.lock"));
        assert_eq!(config.phase_log_dir(), root.join(".primer/logs/phases"));
        assert_eq!(config.failure_policy(), FailurePolicy::Continue);
        assert!(config.verbose);
    }

    #[test]
    fn test_primer_config_reads_toml() {
        let dir = tempdir().unwrap();
        let primer_dir = dir.path().join(".primer");
        std::fs::create_dir_all(&primer_dir).unwrap();
        std::fs::write(
            primer_dir.join("primer.toml"),
            "[project]\nname = \"demo\"\n[defaults]\nfailure_policy = \"continue\"\n",
        )
        .unwrap();

        let config = PrimerConfig::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(config.project_name(), "demo");
        assert_eq!(config.failure_policy(), FailurePolicy::Continue);
    }
}

//! Integration tests for the primer binary
//!
//! These tests drive the CLI end to end against throwaway projects.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a primer Command
fn primer() -> Command {
    cargo_bin_cmd!("primer")
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

const CONFIG: &str = r#"
[preflight]
require_clean_git = false
"#;

/// Initialize a project and replace the template phases.
fn init_with_phases(dir: &TempDir, phases: serde_json::Value) {
    primer()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
    fs::write(dir.path().join(".primer/primer.toml"), CONFIG).unwrap();
    fs::write(
        dir.path().join(".primer/phases.json"),
        serde_json::to_string_pretty(&serde_json::json!({ "phases": phases })).unwrap(),
    )
    .unwrap();
}

/// install -> configure -> seed, each appending its id to `trace.log`.
fn linear_phases() -> serde_json::Value {
    serde_json::json!([
        { "id": "install", "command": "echo install >> trace.log" },
        { "id": "configure", "command": "echo configure >> trace.log", "depends_on": ["install"] },
        { "id": "seed", "command": "echo seed >> trace.log", "depends_on": ["configure"] }
    ])
}

fn trace(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("trace.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn state(dir: &Path) -> serde_json::Value {
    let content = fs::read_to_string(dir.join(".primer/state.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_primer_help() {
        primer()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("status"));
    }

    #[test]
    fn test_primer_version() {
        primer().arg("--version").assert().success();
    }

    #[test]
    fn test_primer_init_creates_structure() {
        let dir = create_temp_project();

        primer()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized primer project"));

        assert!(dir.path().join(".primer/primer.toml").exists());
        assert!(dir.path().join(".primer/phases.json").exists());
        assert!(dir.path().join(".primer/runs").is_dir());
        assert!(!dir.path().join(".primer/state.json").exists());
    }

    #[test]
    fn test_primer_init_idempotent() {
        let dir = create_temp_project();
        primer().current_dir(dir.path()).arg("init").assert().success();
        fs::write(dir.path().join(".primer/phases.json"), r#"{"phases": []}"#).unwrap();

        primer()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));

        // Existing declarations are left alone
        let phases = fs::read_to_string(dir.path().join(".primer/phases.json")).unwrap();
        assert_eq!(phases, r#"{"phases": []}"#);
    }

    #[test]
    fn test_project_dir_flag() {
        let dir = create_temp_project();
        primer()
            .arg("--project-dir")
            .arg(dir.path())
            .arg("init")
            .assert()
            .success();
        assert!(dir.path().join(".primer").is_dir());
    }
}

// =============================================================================
// Run Tests
// =============================================================================

mod run {
    use super::*;

    #[test]
    fn test_run_without_init_is_configuration_error() {
        let dir = create_temp_project();
        primer()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .code(4)
            .stderr(predicate::str::contains("primer init"));
    }

    #[test]
    fn test_run_all_then_rerun_skips() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());

        primer()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .success()
            .stdout(predicate::str::contains("All phases succeeded"));
        assert_eq!(trace(dir.path()), vec!["install", "configure", "seed"]);

        let state = state(dir.path());
        assert_eq!(state["version"], 1);
        assert_eq!(state["records"]["seed"]["status"], "succeeded");
        assert_eq!(state["records"]["seed"]["detail"], "exit code 0");

        primer()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .success()
            .stdout(predicate::str::contains("already succeeded"));
        assert_eq!(trace(dir.path()).len(), 3);
    }

    #[test]
    fn test_run_subset_pulls_in_dependencies() {
        let dir = create_temp_project();
        init_with_phases(
            &dir,
            serde_json::json!([
                { "id": "install", "command": "echo install >> trace.log" },
                { "id": "lint", "command": "echo lint >> trace.log" },
                { "id": "configure", "command": "echo configure >> trace.log", "depends_on": ["install"] }
            ]),
        );

        primer()
            .current_dir(dir.path())
            .args(["run", "configure"])
            .assert()
            .success();
        assert_eq!(trace(dir.path()), vec!["install", "configure"]);
    }

    #[test]
    fn test_dry_run_leaves_no_state() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());

        primer()
            .current_dir(dir.path())
            .args(["run", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("dry run"));

        assert!(trace(dir.path()).is_empty());
        assert!(!dir.path().join(".primer/state.json").exists());
        assert_eq!(fs::read_dir(dir.path().join(".primer/runs")).unwrap().count(), 0);
    }

    #[test]
    fn test_failing_phase_exits_one_and_resumes() {
        let dir = create_temp_project();
        init_with_phases(
            &dir,
            serde_json::json!([
                { "id": "install", "command": "echo install >> trace.log" },
                { "id": "migrate", "command": "test -f ready", "depends_on": ["install"] },
                { "id": "seed", "command": "echo seed >> trace.log", "depends_on": ["migrate"] }
            ]),
        );

        primer()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .code(1)
            .stdout(predicate::str::contains("migrate"));
        assert_eq!(trace(dir.path()), vec!["install"]);
        let recorded = state(dir.path());
        assert_eq!(recorded["records"]["migrate"]["status"], "failed");
        assert_eq!(recorded["records"]["migrate"]["detail"], "exit code 1");
        assert!(recorded["records"].get("seed").is_none());

        fs::write(dir.path().join("ready"), "").unwrap();
        primer()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .success();
        // install is not repeated
        assert_eq!(trace(dir.path()), vec!["install", "seed"]);
    }

    #[test]
    fn test_corrupt_state_is_treated_as_empty() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());
        fs::write(dir.path().join(".primer/state.json"), "{\"version\": 1, \"records\": {").unwrap();

        primer()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .success()
            .stdout(predicate::str::contains("All phases succeeded"));

        assert_eq!(trace(dir.path()), vec!["install", "configure", "seed"]);
        let recorded = state(dir.path());
        assert_eq!(recorded["version"], 1);
        for id in ["install", "configure", "seed"] {
            assert_eq!(recorded["records"][id]["status"], "succeeded");
        }
    }

    #[test]
    fn test_cycle_is_configuration_error() {
        let dir = create_temp_project();
        init_with_phases(
            &dir,
            serde_json::json!([
                { "id": "a", "command": "echo a >> trace.log", "depends_on": ["b"] },
                { "id": "b", "command": "echo b >> trace.log", "depends_on": ["a"] }
            ]),
        );

        primer()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .code(4)
            .stderr(predicate::str::contains("cycle"));
        assert!(trace(dir.path()).is_empty());
        assert!(!dir.path().join(".primer/state.json").exists());
    }

    #[test]
    fn test_unknown_phase_is_configuration_error() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());

        primer()
            .current_dir(dir.path())
            .args(["run", "deploy"])
            .assert()
            .code(4)
            .stderr(predicate::str::contains("Unknown phase 'deploy'"));
    }

    #[test]
    fn test_force_phase_reruns_only_that_phase() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());

        primer().current_dir(dir.path()).arg("run").assert().success();
        primer()
            .current_dir(dir.path())
            .args(["run", "--force-phase", "configure"])
            .assert()
            .success();

        assert_eq!(
            trace(dir.path()),
            vec!["install", "configure", "seed", "configure"]
        );
    }

    #[test]
    fn test_failed_validate_command_is_preflight_error() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());
        fs::write(
            dir.path().join(".primer/primer.toml"),
            "[preflight]\nrequire_clean_git = false\nvalidate_command = \"echo missing DATABASE_URL; exit 1\"\n",
        )
        .unwrap();

        primer()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .code(3)
            .stderr(predicate::str::contains("missing DATABASE_URL"));
        assert!(trace(dir.path()).is_empty());
    }

    #[test]
    fn test_run_writes_run_log() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());

        primer().current_dir(dir.path()).arg("run").assert().success();

        let runs: Vec<_> = fs::read_dir(dir.path().join(".primer/runs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(runs.len(), 1);
        let content = fs::read_to_string(runs[0].path()).unwrap();
        let log: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(log["state"], "completed");
        assert_eq!(log["phases"].as_array().unwrap().len(), 3);
    }
}

// =============================================================================
// Status, List and Clear Tests
// =============================================================================

mod phase_commands {
    use super::*;

    #[test]
    fn test_list_shows_phases_in_declaration_order() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());

        let output = primer()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let stdout = String::from_utf8(output).unwrap();
        let install = stdout.find("install").unwrap();
        let seed = stdout.find("seed").unwrap();
        assert!(install < seed);
        assert!(stdout.contains("3 phase(s)"));
    }

    #[test]
    fn test_status_reports_records() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());

        primer()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("never_run"))
            .stdout(predicate::str::contains("Last run: never"));

        primer().current_dir(dir.path()).arg("run").assert().success();

        primer()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("3/3 phases succeeded"))
            .stdout(predicate::str::contains("exit code 0"));
    }

    #[test]
    fn test_status_marks_changed_phases() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());
        primer().current_dir(dir.path()).arg("run").assert().success();

        init_with_phases(
            &dir,
            serde_json::json!([
                { "id": "install", "command": "echo install-v2 >> trace.log" },
                { "id": "configure", "command": "echo configure >> trace.log", "depends_on": ["install"] },
                { "id": "seed", "command": "echo seed >> trace.log", "depends_on": ["configure"] }
            ]),
        );

        primer()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("changed since last run"));
    }

    #[test]
    fn test_clear_single_phase_reruns_it() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());
        primer().current_dir(dir.path()).arg("run").assert().success();

        primer()
            .current_dir(dir.path())
            .args(["clear", "seed"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cleared record for 'seed'"));

        primer().current_dir(dir.path()).arg("run").assert().success();
        assert_eq!(
            trace(dir.path()),
            vec!["install", "configure", "seed", "seed"]
        );
    }

    #[test]
    fn test_clear_all_with_force() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());
        primer().current_dir(dir.path()).arg("run").assert().success();

        primer()
            .current_dir(dir.path())
            .args(["clear", "--all", "--force"])
            .assert()
            .success();
        assert!(!dir.path().join(".primer/state.json").exists());
    }

    #[test]
    fn test_clear_requires_target() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());

        primer()
            .current_dir(dir.path())
            .arg("clear")
            .assert()
            .code(70);
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();
        primer()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("failure_policy = \"fail-fast\""));
    }

    #[test]
    fn test_config_validate_ok() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());
        primer()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("3 phase(s), no cycles"));
    }

    #[test]
    fn test_config_validate_reports_cycle() {
        let dir = create_temp_project();
        init_with_phases(
            &dir,
            serde_json::json!([
                { "id": "a", "command": "true", "depends_on": ["b"] },
                { "id": "b", "command": "true", "depends_on": ["a"] }
            ]),
        );
        primer()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .code(4)
            .stdout(predicate::str::contains("cycle"));
    }

    #[test]
    fn test_config_invalid_toml_is_configuration_error() {
        let dir = create_temp_project();
        init_with_phases(&dir, linear_phases());
        fs::write(
            dir.path().join(".primer/primer.toml"),
            "[defaults]\ntimeout_secs = \"soon\"\n",
        )
        .unwrap();

        primer()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .code(4);
    }

    #[test]
    fn test_config_init_does_not_overwrite() {
        let dir = create_temp_project();
        primer().current_dir(dir.path()).arg("init").assert().success();
        primer()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }
}

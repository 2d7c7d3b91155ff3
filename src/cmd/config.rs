//! Configuration view and validation commands: `primer config`.

use anyhow::Result;
use std::path::Path;

use primer::dag::PhaseRegistry;
use primer::errors::{BatchError, ExitStatus};
use primer::init::get_primer_dir;
use primer::primer_config::{PrimerConfig, PrimerToml};

use super::super::ConfigCommands;
use super::load_config;

pub fn cmd_config(
    project_dir: &Path,
    command: Option<ConfigCommands>,
) -> Result<ExitStatus, BatchError> {
    let primer_dir = get_primer_dir(project_dir);
    let config_path = primer_dir.join("primer.toml");

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Primer Configuration");
            println!("====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No primer.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let config = load_config(project_dir, false, false)?;
            print_toml(&config.toml);

            println!("Effective values (with env/CLI overrides):");
            print_effective(&config);
            println!();
            Ok(ExitStatus::Success)
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = load_config(project_dir, false, false)?;
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("primer.toml: valid");
            } else {
                println!("primer.toml warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }

            let phases_file = config.phases_file();
            let phases_ok = if phases_file.exists() {
                match PhaseRegistry::load(&phases_file, &config.toml).and_then(|r| {
                    r.validate()?;
                    Ok(r)
                }) {
                    Ok(registry) => {
                        println!("phases.json: {} phase(s), no cycles", registry.len());
                        true
                    }
                    Err(e) => {
                        println!("phases.json: {}", e);
                        false
                    }
                }
            } else {
                println!("phases.json: not found (run 'primer init')");
                true
            };
            println!();

            if warnings.is_empty() && phases_ok {
                Ok(ExitStatus::Success)
            } else {
                Ok(ExitStatus::ConfigurationError)
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("primer.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(ExitStatus::Success);
            }

            if !primer_dir.exists() {
                std::fs::create_dir_all(&primer_dir).map_err(anyhow::Error::from)?;
            }

            PrimerToml::default().save(&config_path)?;

            println!("Created primer.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [project] name, shell");
            println!("  - [defaults] timeout_secs, failure_policy, capture_output");
            println!("  - [preflight] require_clean_git, validate_command, required_files");
            println!("  - [phases.overrides.\"pattern-*\"] for phase-specific timeouts");
            println!("  - [logging] level, format, file");
            println!();
            Ok(ExitStatus::Success)
        }
    }
}

fn print_toml(toml: &PrimerToml) {
    if toml.project.name.is_some() || toml.project.shell.is_some() {
        println!("[project]");
        if let Some(name) = &toml.project.name {
            println!("  name = \"{}\"", name);
        }
        if let Some(shell) = &toml.project.shell {
            println!("  shell = \"{}\"", shell);
        }
        println!();
    }

    println!("[defaults]");
    match toml.defaults.timeout_secs {
        Some(secs) => println!("  timeout_secs = {}", secs),
        None => println!("  timeout_secs = (none)"),
    }
    println!("  failure_policy = \"{}\"", toml.defaults.failure_policy);
    println!("  capture_output = {}", toml.defaults.capture_output);
    println!();

    println!("[preflight]");
    println!("  require_clean_git = {}", toml.preflight.require_clean_git);
    if let Some(cmd) = &toml.preflight.validate_command {
        println!("  validate_command = \"{}\"", cmd);
    }
    if !toml.preflight.required_files.is_empty() {
        let files: Vec<String> = toml
            .preflight
            .required_files
            .iter()
            .map(|p| format!("\"{}\"", p.display()))
            .collect();
        println!("  required_files = [{}]", files.join(", "));
    }
    println!();

    if !toml.phases.overrides.is_empty() {
        println!("[phases.overrides]");
        for (pattern, override_cfg) in &toml.phases.overrides {
            println!("  \"{}\":", pattern);
            if let Some(secs) = override_cfg.timeout_secs {
                println!("    timeout_secs = {}", secs);
            }
        }
        println!();
    }

    println!("[logging]");
    println!("  level = \"{}\"", toml.logging.level);
    println!("  format = \"{}\"", toml.logging.format);
    println!("  file = {}", toml.logging.file);
    println!();
}

fn print_effective(config: &PrimerConfig) {
    println!("  project = \"{}\"", config.project_name());
    println!("  shell = \"{}\"", config.shell());
    println!("  failure_policy = \"{}\"", config.failure_policy());
}

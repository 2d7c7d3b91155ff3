//! Initialization module for primer projects.
//!
//! `primer init` creates the `.primer/` directory structure:
//!
//! ```text
//! .primer/
//! ├── primer.toml      # Configuration (template)
//! ├── phases.json      # Phase declarations (template)
//! ├── .gitignore       # Keeps runtime files out of version control
//! ├── state.json       # Execution records (created on first run)
//! ├── runs/            # Per-batch run logs
//! └── logs/            # primer.log and captured phase output
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::phase::{PhasesFile, template_phases};
use crate::primer_config::PrimerToml;

/// The name of the primer configuration directory.
pub const PRIMER_DIR: &str = ".primer";

const GITIGNORE: &str = "state.json\nstate.json.tmp\nstate.lock\nruns/\nlogs/\n";

/// Result of initializing a primer project.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the .primer directory
    pub primer_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
}

/// Initialize a primer project in the given directory.
///
/// Existing files are never overwritten, so running this twice is safe.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let primer_dir = project_dir.join(PRIMER_DIR);
    let created = !primer_dir.exists();

    std::fs::create_dir_all(&primer_dir)
        .with_context(|| format!("Failed to create directory: {}", primer_dir.display()))?;

    ensure_directory_structure(&primer_dir)?;

    Ok(InitResult {
        primer_dir,
        created,
    })
}

/// Ensure all required subdirectories and template files exist.
fn ensure_directory_structure(primer_dir: &Path) -> Result<()> {
    for sub in ["runs", "logs"] {
        let path = primer_dir.join(sub);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }

    let config_file = primer_dir.join("primer.toml");
    if !config_file.exists() {
        PrimerToml::default().save(&config_file)?;
    }

    let phases_file = primer_dir.join("phases.json");
    if !phases_file.exists() {
        PhasesFile {
            phases: template_phases(),
        }
        .save(&phases_file)?;
    }

    let gitignore = primer_dir.join(".gitignore");
    if !gitignore.exists() {
        std::fs::write(&gitignore, GITIGNORE)
            .with_context(|| format!("Failed to create {}", gitignore.display()))?;
    }

    Ok(())
}

/// Check if a project is already initialized with primer.
pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(PRIMER_DIR).exists()
}

/// Get the path to the primer directory for a project.
pub fn get_primer_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(PRIMER_DIR)
}

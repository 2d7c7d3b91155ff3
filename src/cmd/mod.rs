//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                  |
//! |-----------------|-----------------------------------|
//! | `run`           | `Run`                             |
//! | `phase`         | `List`, `Status`, `Clear`         |
//! | `project`       | `Init`                            |
//! | `config`        | `Config`                          |
//!
//! Commands return the `ExitStatus` the process should exit with; errors are
//! mapped to a status in `main`.

pub mod config;
pub mod phase;
pub mod project;
pub mod run;

pub use config::cmd_config;
pub use phase::{cmd_clear, cmd_list, cmd_status};
pub use project::cmd_init;
pub use run::cmd_run;

use primer::errors::ConfigurationError;
use primer::primer_config::PrimerConfig;
use std::path::Path;

/// Load `primer.toml`, reporting parse failures as configuration errors.
pub(crate) fn load_config(
    project_dir: &Path,
    verbose: bool,
    continue_on_failure: bool,
) -> Result<PrimerConfig, ConfigurationError> {
    PrimerConfig::with_cli_args(project_dir.to_path_buf(), verbose, continue_on_failure).map_err(
        |e| ConfigurationError::Declarations {
            path: project_dir.join(primer::init::PRIMER_DIR).join("primer.toml"),
            message: format!("{:#}", e),
        },
    )
}

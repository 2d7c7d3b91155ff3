//! Project initialization: `primer init`.

use anyhow::Result;
use std::path::Path;

use primer::errors::ExitStatus;
use primer::init::{init_project, is_initialized};

pub fn cmd_init(project_dir: &Path) -> Result<ExitStatus> {
    let was_initialized = is_initialized(project_dir);

    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized primer project at {}",
            result.primer_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .primer/");
        println!("  ├── primer.toml   # Configuration");
        println!("  ├── phases.json   # Phase declarations");
        println!("  ├── runs/         # Per-batch run logs");
        println!("  └── logs/         # primer.log and captured phase output");
        println!();
        println!("Next steps:");
        println!("  1. Declare your setup phases in .primer/phases.json");
        println!("  2. Run `primer run --dry-run` to check the plan");
        println!("  3. Run `primer run` to execute");
    } else if was_initialized {
        println!(
            "Primer project already initialized at {}",
            result.primer_dir.display()
        );
        println!("Directory structure verified.");
    }

    Ok(ExitStatus::Success)
}

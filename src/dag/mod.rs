//! Phase registry and run planning.
//!
//! Phases declare their dependencies explicitly. The registry validates the
//! declarations and resolves a plan: the dependency closure of the requested
//! phases, in topological order, each tagged run or skip.
//!
//! ## Architecture
//!
//! 1. **Builder** - Validates declarations and builds the dependency graph
//! 2. **Plan** - Detects cycles, orders phases and tags skips from the state store
//!
//! ## Example
//!
//! ```no_run
//! use primer::dag::{ForceRerun, PhaseRegistry};
//! use primer::orchestrator::StateStore;
//! use primer::phase::Phase;
//!
//! # fn example() -> anyhow::Result<()> {
//! let phases = vec![
//!     Phase::new("install", "npm ci", vec![]),
//!     Phase::new("migrate", "make migrate", vec!["install".to_string()]),
//!     Phase::new("seed", "make seed", vec!["migrate".to_string()]),
//! ];
//!
//! let registry = PhaseRegistry::discover(phases)?;
//! let store = StateStore::open(".primer/state.json".into());
//! let plan = registry.resolve(&["seed".to_string()], &store, &ForceRerun::None)?;
//! // [install, migrate, seed], minus whatever already succeeded
//! println!("{:?}", plan.to_run());
//! # Ok(())
//! # }
//! ```

mod builder;
mod plan;

pub use builder::{PhaseIndex, PhaseRegistry};
pub use plan::{ForceRerun, PlanAction, PlannedPhase, RunPlan};

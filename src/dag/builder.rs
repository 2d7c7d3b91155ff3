//! Phase registry: validated phase declarations and their dependency graph.
//!
//! Discovery only reads declarations. Every phase id must be unique and
//! well-formed, and every dependency must name a declared phase. Cycles are
//! detected later, when a plan is resolved.

use crate::errors::ConfigurationError;
use crate::phase::{Phase, PhasesFile};
use crate::primer_config::PrimerToml;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

static PHASE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").unwrap());

/// Index into the declaration list.
pub type PhaseIndex = usize;

/// The set of declared phases, in declaration order, with dependency edges.
#[derive(Debug, Clone)]
pub struct PhaseRegistry {
    /// Phases in declaration order
    phases: Vec<Phase>,
    /// Map from phase id to index
    index_map: HashMap<String, PhaseIndex>,
    /// index -> phases that depend on it
    dependents: Vec<Vec<PhaseIndex>>,
    /// index -> phases it depends on
    dependencies: Vec<Vec<PhaseIndex>>,
}

impl PhaseRegistry {
    /// Validate declarations and build the registry.
    pub fn discover(phases: Vec<Phase>) -> Result<Self, ConfigurationError> {
        let mut index_map = HashMap::new();
        for (i, phase) in phases.iter().enumerate() {
            if !PHASE_ID_REGEX.is_match(&phase.id) {
                return Err(ConfigurationError::InvalidPhaseId {
                    id: phase.id.clone(),
                });
            }
            if index_map.insert(phase.id.clone(), i).is_some() {
                return Err(ConfigurationError::DuplicatePhase {
                    id: phase.id.clone(),
                });
            }
        }

        let mut dependents: Vec<Vec<PhaseIndex>> = vec![Vec::new(); phases.len()];
        let mut dependencies: Vec<Vec<PhaseIndex>> = vec![Vec::new(); phases.len()];

        for (to_idx, phase) in phases.iter().enumerate() {
            for dep in &phase.depends_on {
                if dep == &phase.id {
                    return Err(ConfigurationError::SelfDependency {
                        phase: phase.id.clone(),
                    });
                }
                let from_idx = *index_map.get(dep).ok_or_else(|| {
                    ConfigurationError::UnknownDependency {
                        phase: phase.id.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                if dependencies[to_idx].contains(&from_idx) {
                    continue;
                }
                dependents[from_idx].push(to_idx);
                dependencies[to_idx].push(from_idx);
            }
        }

        Ok(Self {
            phases,
            index_map,
            dependents,
            dependencies,
        })
    }

    /// Load `phases.json`, fill in configured timeouts, and discover.
    pub fn load(phases_file: &Path, config: &PrimerToml) -> Result<Self, ConfigurationError> {
        let file = PhasesFile::load(phases_file).map_err(|e| ConfigurationError::Declarations {
            path: phases_file.to_path_buf(),
            message: format!("{:#}", e),
        })?;

        let phases = file
            .phases
            .into_iter()
            .map(|mut phase| {
                if phase.timeout_secs.is_none() {
                    phase.timeout_secs = config.timeout_for(&phase.id);
                }
                phase
            })
            .collect();

        Self::discover(phases)
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// All phases in declaration order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn get(&self, id: &str) -> Option<&Phase> {
        self.index_map.get(id).map(|&i| &self.phases[i])
    }

    pub fn get_index(&self, id: &str) -> Option<PhaseIndex> {
        self.index_map.get(id).copied()
    }

    pub fn phase_at(&self, index: PhaseIndex) -> &Phase {
        &self.phases[index]
    }

    /// Phases that depend on the given phase.
    pub fn dependents(&self, index: PhaseIndex) -> &[PhaseIndex] {
        self.dependents.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Phases the given phase depends on.
    pub fn dependencies(&self, index: PhaseIndex) -> &[PhaseIndex] {
        self.dependencies.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Ids of every declared phase, in declaration order.
    pub fn ids(&self) -> Vec<String> {
        self.phases.iter().map(|p| p.id.clone()).collect()
    }
}

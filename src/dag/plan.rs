//! Run plan resolution.
//!
//! A plan is the dependency closure of the requested phases in topological
//! order. Ties are broken by declaration order, so the plan is stable across
//! runs. Each entry is tagged `Run` or `Skip`; phases that already succeeded
//! are skipped unless forced.

use crate::dag::builder::{PhaseIndex, PhaseRegistry};
use crate::errors::ConfigurationError;
use crate::orchestrator::state::StateStore;
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Which phases re-run even though they already succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ForceRerun {
    #[default]
    None,
    All,
    Phases(HashSet<String>),
}

impl ForceRerun {
    /// Build from CLI flags: `--force` wins over any `--force-phase` list.
    pub fn from_flags(all: bool, phases: &[String]) -> Self {
        if all {
            ForceRerun::All
        } else if phases.is_empty() {
            ForceRerun::None
        } else {
            ForceRerun::Phases(phases.iter().cloned().collect())
        }
    }

    pub fn is_forced(&self, id: &str) -> bool {
        match self {
            ForceRerun::None => false,
            ForceRerun::All => true,
            ForceRerun::Phases(ids) => ids.contains(id),
        }
    }
}

/// What the executor should do with a planned phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Run,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPhase {
    pub id: String,
    pub action: PlanAction,
}

/// Ordered phases to attempt for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPlan {
    pub entries: Vec<PlannedPhase>,
}

impl RunPlan {
    /// Ids in plan order, including skipped phases.
    pub fn order(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    /// Ids that will be executed.
    pub fn to_run(&self) -> Vec<&str> {
        self.ids_with(PlanAction::Run)
    }

    /// Ids skipped because they already succeeded.
    pub fn to_skip(&self) -> Vec<&str> {
        self.ids_with(PlanAction::Skip)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ids_with(&self, action: PlanAction) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.action == action)
            .map(|e| e.id.as_str())
            .collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl PhaseRegistry {
    /// Resolve a plan for the requested phases.
    pub fn resolve(
        &self,
        requested: &[String],
        store: &StateStore,
        force: &ForceRerun,
    ) -> Result<RunPlan, ConfigurationError> {
        let mut roots = Vec::with_capacity(requested.len());
        for id in requested {
            let index = self
                .get_index(id)
                .ok_or_else(|| ConfigurationError::UnknownPhase { id: id.clone() })?;
            roots.push(index);
        }

        let closure = self.closure(&roots);
        self.check_cycles(&closure)?;
        let order = self.topological_order(&closure);

        let entries = order
            .into_iter()
            .map(|index| {
                let id = self.phase_at(index).id.clone();
                let action = if store.has_succeeded(&id) && !force.is_forced(&id) {
                    PlanAction::Skip
                } else {
                    PlanAction::Run
                };
                PlannedPhase { id, action }
            })
            .collect();

        Ok(RunPlan { entries })
    }

    /// Resolve a plan over every declared phase.
    pub fn resolve_all(
        &self,
        store: &StateStore,
        force: &ForceRerun,
    ) -> Result<RunPlan, ConfigurationError> {
        self.resolve(&self.ids(), store, force)
    }

    /// Check the whole declaration set for cycles.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let all: BTreeSet<PhaseIndex> = (0..self.len()).collect();
        self.check_cycles(&all)
    }

    /// Requested phases plus everything they transitively depend on.
    fn closure(&self, roots: &[PhaseIndex]) -> BTreeSet<PhaseIndex> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<PhaseIndex> = roots.iter().copied().collect();
        while let Some(index) = queue.pop_front() {
            if seen.insert(index) {
                queue.extend(self.dependencies(index).iter().copied());
            }
        }
        seen
    }

    /// Depth-first search for a back edge. The reported cycle starts and ends
    /// with the same phase, e.g. `a -> b -> a`.
    fn check_cycles(&self, nodes: &BTreeSet<PhaseIndex>) -> Result<(), ConfigurationError> {
        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut stack = Vec::new();

        for &start in nodes {
            if marks[start] == Mark::Unvisited
                && let Some(cycle) = self.visit(start, &mut marks, &mut stack)
            {
                let members = cycle
                    .into_iter()
                    .map(|i| self.phase_at(i).id.clone())
                    .collect();
                return Err(ConfigurationError::Cycle { members });
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        index: PhaseIndex,
        marks: &mut [Mark],
        stack: &mut Vec<PhaseIndex>,
    ) -> Option<Vec<PhaseIndex>> {
        marks[index] = Mark::OnStack;
        stack.push(index);

        for &dep in self.dependencies(index) {
            match marks[dep] {
                Mark::OnStack => {
                    let start = stack.iter().position(|&i| i == dep).unwrap_or(0);
                    let mut cycle: Vec<PhaseIndex> = stack[start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = self.visit(dep, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        stack.pop();
        marks[index] = Mark::Done;
        None
    }

    /// Kahn's algorithm over an acyclic, dependency-closed node set, always
    /// taking the earliest-declared ready phase.
    fn topological_order(&self, nodes: &BTreeSet<PhaseIndex>) -> Vec<PhaseIndex> {
        let mut remaining: Vec<usize> = vec![0; self.len()];
        for &index in nodes {
            remaining[index] = self.dependencies(index).len();
        }

        let mut ready: BTreeSet<PhaseIndex> = nodes
            .iter()
            .copied()
            .filter(|&i| remaining[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(nodes.len());

        while let Some(index) = ready.pop_first() {
            order.push(index);
            for &dependent in self.dependents(index) {
                if !nodes.contains(&dependent) {
                    continue;
                }
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use tempfile::tempdir;

    fn phase(id: &str, deps: &[&str]) -> Phase {
        Phase::new(id, "true", deps.iter().map(|d| d.to_string()).collect())
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn bootstrap_registry() -> PhaseRegistry {
        PhaseRegistry::discover(vec![
            phase("install", &[]),
            phase("migrate", &["install"]),
            phase("seed", &["migrate"]),
        ])
        .unwrap()
    }

    fn empty_store() -> (StateStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (StateStore::open(dir.path().join("state.json")), dir)
    }

    #[test]
    fn test_resolve_includes_dependency_closure() {
        let registry = bootstrap_registry();
        let (store, _dir) = empty_store();

        let plan = registry
            .resolve(&ids(&["seed"]), &store, &ForceRerun::None)
            .unwrap();
        assert_eq!(plan.order(), vec!["install", "migrate", "seed"]);
        assert_eq!(plan.to_run(), vec!["install", "migrate", "seed"]);
        assert!(plan.to_skip().is_empty());
    }

    #[test]
    fn test_resolve_skips_succeeded_phases() {
        let registry = bootstrap_registry();
        let (mut store, _dir) = empty_store();
        store.mark_success("install", "exit code 0").unwrap();

        let plan = registry
            .resolve(&ids(&["seed"]), &store, &ForceRerun::None)
            .unwrap();
        assert_eq!(plan.to_run(), vec!["migrate", "seed"]);
        assert_eq!(plan.to_skip(), vec!["install"]);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_resolve_force_reruns_succeeded_phases() {
        let registry = bootstrap_registry();
        let (mut store, _dir) = empty_store();
        store.mark_success("install", "ok").unwrap();
        store.mark_success("migrate", "ok").unwrap();

        let one = ForceRerun::from_flags(false, &ids(&["install"]));
        let plan = registry.resolve(&ids(&["seed"]), &store, &one).unwrap();
        assert_eq!(plan.to_run(), vec!["install", "seed"]);
        assert_eq!(plan.to_skip(), vec!["migrate"]);

        let all = ForceRerun::from_flags(true, &[]);
        let plan = registry.resolve(&ids(&["seed"]), &store, &all).unwrap();
        assert_eq!(plan.to_run(), vec!["install", "migrate", "seed"]);
    }

    #[test]
    fn test_resolve_unknown_phase() {
        let registry = bootstrap_registry();
        let (store, _dir) = empty_store();

        let err = registry
            .resolve(&ids(&["deploy"]), &store, &ForceRerun::None)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownPhase { ref id } if id == "deploy"));
    }

    #[test]
    fn test_resolve_detects_two_phase_cycle() {
        let registry =
            PhaseRegistry::discover(vec![phase("a", &["b"]), phase("b", &["a"])]).unwrap();
        let (store, _dir) = empty_store();

        let err = registry.resolve_all(&store, &ForceRerun::None).unwrap_err();
        match err {
            ConfigurationError::Cycle { members } => {
                assert_eq!(members, vec!["a", "b", "a"]);
            }
            other => panic!("Expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_cycle_outside_request_is_ignored() {
        let registry = PhaseRegistry::discover(vec![
            phase("ok", &[]),
            phase("x", &["y"]),
            phase("y", &["x"]),
        ])
        .unwrap();
        let (store, _dir) = empty_store();

        let plan = registry
            .resolve(&ids(&["ok"]), &store, &ForceRerun::None)
            .unwrap();
        assert_eq!(plan.order(), vec!["ok"]);
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_cycle_members_exclude_entry_path() {
        let registry = PhaseRegistry::discover(vec![
            phase("entry", &["a"]),
            phase("a", &["b"]),
            phase("b", &["c"]),
            phase("c", &["a"]),
        ])
        .unwrap();

        match registry.validate().unwrap_err() {
            ConfigurationError::Cycle { members } => {
                assert_eq!(members, vec!["a", "b", "c", "a"]);
            }
            other => panic!("Expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let registry = PhaseRegistry::discover(vec![
            phase("docs", &[]),
            phase("env", &[]),
            phase("deps", &["env"]),
            phase("build", &["deps", "docs"]),
            phase("assets", &[]),
        ])
        .unwrap();
        let (store, _dir) = empty_store();

        let plan = registry.resolve_all(&store, &ForceRerun::None).unwrap();
        assert_eq!(plan.order(), vec!["docs", "env", "deps", "build", "assets"]);
    }

    #[test]
    fn test_dependency_declared_after_dependent() {
        let registry =
            PhaseRegistry::discover(vec![phase("app", &["base"]), phase("base", &[])]).unwrap();
        let (store, _dir) = empty_store();

        let plan = registry.resolve_all(&store, &ForceRerun::None).unwrap();
        assert_eq!(plan.order(), vec!["base", "app"]);
    }

    #[test]
    fn test_plan_never_places_phase_before_dependency() {
        let registry = PhaseRegistry::discover(vec![
            phase("f", &["e", "c"]),
            phase("e", &["d"]),
            phase("d", &["a"]),
            phase("c", &["b"]),
            phase("b", &["a"]),
            phase("a", &[]),
        ])
        .unwrap();
        let (store, _dir) = empty_store();

        let plan = registry.resolve_all(&store, &ForceRerun::None).unwrap();
        let order = plan.order();
        assert_eq!(order.len(), 6);
        for phase in registry.phases() {
            let pos = order.iter().position(|id| *id == phase.id).unwrap();
            for dep in &phase.depends_on {
                let dep_pos = order.iter().position(|id| id == dep).unwrap();
                assert!(dep_pos < pos, "{} planned before its dependency {}", phase.id, dep);
            }
        }
    }

    #[test]
    fn test_duplicate_requests_collapse() {
        let registry = bootstrap_registry();
        let (store, _dir) = empty_store();

        let plan = registry
            .resolve(&ids(&["migrate", "install", "migrate"]), &store, &ForceRerun::None)
            .unwrap();
        assert_eq!(plan.order(), vec!["install", "migrate"]);
    }

    #[test]
    fn test_force_rerun_from_flags() {
        assert_eq!(ForceRerun::from_flags(false, &[]), ForceRerun::None);
        assert_eq!(ForceRerun::from_flags(true, &ids(&["a"])), ForceRerun::All);
        let some = ForceRerun::from_flags(false, &ids(&["a"]));
        assert!(some.is_forced("a"));
        assert!(!some.is_forced("b"));
    }
}

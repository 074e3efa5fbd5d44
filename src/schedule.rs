//! Stages and system ordering.
//!
//! Stages are named buckets executed in list order. Within a stage, systems
//! are topologically sorted from their before/after label edges (Kahn's
//! algorithm) with declaration order as the tiebreaker. A before/after
//! reference to a label that does not exist in the stage, or an ordering
//! cycle, is rejected loudly in debug builds; release builds drop the
//! offending edge and proceed.

use rustc_hash::FxHashMap;

use crate::error::{EcsError, Result};
use crate::system::SystemDesc;

/// Names of the six default stages, in canonical execution order.
pub mod stage {
    /// Runs exactly once, before the first frame.
    pub const STARTUP: &str = "Startup";
    pub const FIRST: &str = "First";
    pub const PRE_UPDATE: &str = "PreUpdate";
    pub const UPDATE: &str = "Update";
    pub const POST_UPDATE: &str = "PostUpdate";
    pub const LAST: &str = "Last";
}

/// A named bucket of systems.
pub struct Stage {
    name: String,
    pub(crate) systems: Vec<SystemDesc>,
}

impl Stage {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            systems: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }
}

/// Ordered stage list.
pub struct Schedule {
    stages: Vec<Stage>,
}

impl Schedule {
    /// A schedule with the six default stages.
    pub fn with_default_stages() -> Self {
        let stages = [
            stage::STARTUP,
            stage::FIRST,
            stage::PRE_UPDATE,
            stage::UPDATE,
            stage::POST_UPDATE,
            stage::LAST,
        ]
        .iter()
        .map(|name| Stage::new(name))
        .collect();
        Self { stages }
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|stage| stage.name == name)
    }

    pub fn stage_name(&self, index: usize) -> Option<&str> {
        self.stages.get(index).map(Stage::name)
    }

    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    pub(crate) fn stage_mut_by_name(&mut self, name: &str) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|stage| stage.name == name)
    }

    pub(crate) fn stage_mut(&mut self, index: usize) -> &mut Stage {
        &mut self.stages[index]
    }

    /// Append a custom stage at the end of the order.
    pub fn add_stage(&mut self, name: &str) -> Result<()> {
        self.insert_stage(self.stages.len(), name)
    }

    /// Insert a custom stage pinned just before `anchor`.
    pub fn add_stage_before(&mut self, name: &str, anchor: &str) -> Result<()> {
        let index = self
            .stage_index(anchor)
            .ok_or_else(|| EcsError::ScheduleError(format!("unknown stage `{anchor}`")))?;
        self.insert_stage(index, name)
    }

    /// Insert a custom stage pinned just after `anchor`.
    pub fn add_stage_after(&mut self, name: &str, anchor: &str) -> Result<()> {
        let index = self
            .stage_index(anchor)
            .ok_or_else(|| EcsError::ScheduleError(format!("unknown stage `{anchor}`")))?;
        self.insert_stage(index + 1, name)
    }

    fn insert_stage(&mut self, index: usize, name: &str) -> Result<()> {
        if self.stage_index(name).is_some() {
            return Err(EcsError::ScheduleError(format!(
                "stage `{name}` already exists"
            )));
        }
        self.stages.insert(index, Stage::new(name));
        Ok(())
    }
}

/// Topologically sort a stage's systems, returning execution order as
/// indices into `systems`.
///
/// Edge rule: "X before Y" puts X ahead of Y. Among ready systems,
/// declaration order wins.
pub(crate) fn sorted_order(systems: &[SystemDesc]) -> Vec<usize> {
    let count = systems.len();
    if count <= 1 {
        return (0..count).collect();
    }

    let mut labels: FxHashMap<&str, usize> = FxHashMap::default();
    for (index, system) in systems.iter().enumerate() {
        if let Some(label) = system.label() {
            debug_assert!(
                !labels.contains_key(label),
                "duplicate system label `{label}` in stage"
            );
            labels.insert(label, index);
        }
    }

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0usize; count];
    let mut add_edge = |from: usize, to: usize, successors: &mut Vec<Vec<usize>>| {
        successors[from].push(to);
        in_degree[to] += 1;
    };

    for (index, system) in systems.iter().enumerate() {
        for label in &system.after {
            match labels.get(label.as_str()) {
                Some(&target) => add_edge(target, index, &mut successors),
                None => {
                    debug_assert!(false, "system ordering references unknown label `{label}`");
                }
            }
        }
        for label in &system.before {
            match labels.get(label.as_str()) {
                Some(&target) => add_edge(index, target, &mut successors),
                None => {
                    debug_assert!(false, "system ordering references unknown label `{label}`");
                }
            }
        }
    }

    let mut order = Vec::with_capacity(count);
    let mut placed = vec![false; count];
    while order.len() < count {
        // Lowest declaration index among ready systems.
        let next = (0..count).find(|&index| !placed[index] && in_degree[index] == 0);
        let next = match next {
            Some(index) => index,
            None => {
                // Ordering cycle: break it at the earliest-declared
                // remaining system.
                debug_assert!(false, "system ordering cycle detected");
                (0..count)
                    .find(|&index| !placed[index])
                    .expect("unplaced system exists")
            }
        };

        placed[next] = true;
        order.push(next);
        for &successor in &successors[next] {
            in_degree[successor] = in_degree[successor].saturating_sub(1);
        }
    }
    order
}

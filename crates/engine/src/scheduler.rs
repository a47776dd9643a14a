//! Execution planning
//!
//! Turns declaration-ordered selections into stages:
//! - a `require_serial` hook always gets a singleton stage
//! - consecutive non-serial hooks share one parallel stage
//! - a hook with nothing selected and no `always_run` is left out
//!
//! Stages run strictly one after another; only hooks inside a parallel stage
//! may overlap.

use crate::classify::Selection;
use std::slice;

/// One step of an execution plan
#[derive(Debug, Clone)]
pub enum Stage {
    /// A single `require_serial` hook
    Serial(Selection),
    /// Hooks that may run concurrently, in declaration order
    Parallel(Vec<Selection>),
}

impl Stage {
    /// Hooks of this stage in declaration order
    #[must_use]
    pub fn hooks(&self) -> &[Selection] {
        match self {
            Stage::Serial(selection) => slice::from_ref(selection),
            Stage::Parallel(selections) => selections,
        }
    }

    /// Number of hooks in this stage
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks().len()
    }

    /// Whether the stage holds no hook
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks().is_empty()
    }

    /// Whether this is a singleton serial stage
    #[must_use]
    pub fn is_serial(&self) -> bool {
        matches!(self, Stage::Serial(_))
    }
}

/// Ordered stages for one run
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    stages: Vec<Stage>,
}

impl ExecutionPlan {
    /// Stages in execution order
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Whether nothing will run
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Total number of planned hooks
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.stages.iter().map(Stage::len).sum()
    }

    /// Planned hook ids in declaration order
    pub fn hook_ids(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .flat_map(Stage::hooks)
            .map(|s| s.hook.id.as_str())
    }
}

/// Builds [`ExecutionPlan`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler;

impl Scheduler {
    /// Group selections into stages, keeping declaration order
    #[must_use]
    pub fn plan(selections: Vec<Selection>) -> ExecutionPlan {
        let mut stages = Vec::new();
        let mut group: Vec<Selection> = Vec::new();

        for selection in selections {
            if !selection.is_runnable() {
                tracing::debug!(hook = %selection.hook.id, "No files selected, leaving hook out of plan");
                continue;
            }

            if selection.hook.require_serial {
                if !group.is_empty() {
                    stages.push(Stage::Parallel(std::mem::take(&mut group)));
                }
                stages.push(Stage::Serial(selection));
            } else {
                group.push(selection);
            }
        }

        if !group.is_empty() {
            stages.push(Stage::Parallel(group));
        }

        tracing::debug!(stages = stages.len(), "Built execution plan");
        ExecutionPlan { stages }
    }
}

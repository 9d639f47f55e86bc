use super::steps::{StepKind, Workflow};
use crate::model::ConfigModel;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What happens to later steps when an earlier, already-validated step is edited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum GatingPolicy {
    /// The cursor never moves back; steps unlocked earlier stay visible even if stale.
    ForwardOnly,
    /// The cursor is recomputed from the first step on every edit, re-locking
    /// everything after the first step that is no longer valid.
    #[default]
    RevalidateDownstream,
}

/// Cursor over a workflow's steps.
///
/// Steps are 1-based. The cursor points at the furthest step the user may
/// enter; it exceeds the step count once the final step has been validated.
#[derive(Debug, Clone)]
pub struct StepGraph {
    workflow: Workflow,
    policy: GatingPolicy,
    cursor: usize,
    validated: Vec<bool>,
}

impl StepGraph {
    pub fn new(workflow: Workflow, policy: GatingPolicy) -> Self {
        Self {
            workflow,
            policy,
            cursor: 1,
            validated: vec![false; workflow.steps().len()],
        }
    }

    pub fn workflow(&self) -> Workflow {
        self.workflow
    }

    pub fn policy(&self) -> GatingPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.validated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validated.is_empty()
    }

    pub fn current_step(&self) -> usize {
        self.cursor
    }

    /// The final step has been validated.
    pub fn is_complete(&self) -> bool {
        self.cursor > self.len()
    }

    /// Whether the step at `index` has passed its validity check at least once.
    pub fn was_validated(&self, index: usize) -> bool {
        index
            .checked_sub(1)
            .and_then(|i| self.validated.get(i))
            .copied()
            .unwrap_or(false)
    }

    /// A step renders once the cursor has reached it and its readiness holds.
    pub fn is_rendered(&self, index: usize, cfg: &ConfigModel) -> bool {
        match self.workflow.step(index) {
            Some(kind) => self.cursor >= index && self.workflow.is_ready(kind, cfg),
            None => false,
        }
    }

    /// Re-evaluate the steps against the configuration and move the cursor.
    pub fn observe(&mut self, cfg: &ConfigModel) -> usize {
        let before = self.cursor;
        match self.policy {
            GatingPolicy::ForwardOnly => self.advance_forward(cfg),
            GatingPolicy::RevalidateDownstream => self.recompute(cfg),
        }
        if self.cursor != before {
            debug!(
                workflow = ?self.workflow,
                from = before,
                to = self.cursor,
                "wizard cursor moved"
            );
        }
        self.cursor
    }

    // Every rendered step that is valid pushes the cursor to its target; since
    // targets lie ahead, one ordered pass also reaches steps revealed on the way.
    fn advance_forward(&mut self, cfg: &ConfigModel) {
        for index in 1..=self.len() {
            if !self.is_rendered(index, cfg) {
                continue;
            }
            if self.check(index, cfg) {
                self.cursor = self.cursor.max(self.workflow.next_step(index, cfg));
            }
        }
    }

    fn recompute(&mut self, cfg: &ConfigModel) {
        let mut cursor = 1;
        while let Some(kind) = self.workflow.step(cursor) {
            if !self.workflow.is_ready(kind, cfg) || !self.check(cursor, cfg) {
                break;
            }
            cursor = self.workflow.next_step(cursor, cfg);
        }
        self.cursor = cursor;
    }

    fn check(&mut self, index: usize, cfg: &ConfigModel) -> bool {
        let Some(kind) = self.workflow.step(index) else {
            return false;
        };
        let valid = self.workflow.is_valid(kind, cfg);
        if valid && !self.validated[index - 1] {
            self.validated[index - 1] = true;
            debug!(step = index, kind = ?kind, "step validated");
        }
        valid
    }

    pub fn step_kind(&self, index: usize) -> Option<StepKind> {
        self.workflow.step(index)
    }
}

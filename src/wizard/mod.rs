//! Guarded multi-step configuration wizard.
//!
//! A [`Wizard`] owns the [`ConfigModel`] being built and the [`StepGraph`]
//! gating it. Every edit goes through [`Wizard::edit`], which re-evaluates the
//! steps so the cursor always reflects the current configuration.

mod graph;
mod steps;

pub use graph::{GatingPolicy, StepGraph};
pub use steps::{StepKind, Workflow};

use crate::error::WizardError;
use crate::model::{ConfigModel, Submission};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum WizardPhase {
    Configuring { step: usize },
    ReadyToSubmit,
}

/// One rendered step, for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub index: usize,
    pub kind: StepKind,
    pub title: &'static str,
    pub valid: bool,
}

#[derive(Debug, Clone)]
pub struct Wizard {
    graph: StepGraph,
    config: ConfigModel,
}

impl Wizard {
    pub fn new(workflow: Workflow) -> Self {
        Self::with_policy(workflow, GatingPolicy::default())
    }

    pub fn with_policy(workflow: Workflow, policy: GatingPolicy) -> Self {
        Self {
            graph: StepGraph::new(workflow, policy),
            config: ConfigModel::default(),
        }
    }

    /// Fill a wizard from a finished configuration one step at a time, the way
    /// a user would; stops at the first step that never becomes visible.
    ///
    /// Fields no step of the workflow collects are carried over as they are,
    /// so optional extras in the file survive.
    pub fn replay(workflow: Workflow, policy: GatingPolicy, source: &ConfigModel) -> Self {
        let mut wizard = Self::with_policy(workflow, policy);
        let blank = ConfigModel::default();
        wizard.config = source.clone();
        wizard.config.individual_generator = None;
        for kind in workflow.steps() {
            workflow.copy_fields(*kind, &blank, &mut wizard.config);
        }
        for (i, kind) in workflow.steps().iter().enumerate() {
            if !wizard.is_rendered(i + 1) {
                break;
            }
            wizard.edit(|cfg| workflow.copy_fields(*kind, source, cfg));
        }
        wizard
    }

    pub fn workflow(&self) -> Workflow {
        self.graph.workflow()
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    pub fn config(&self) -> &ConfigModel {
        &self.config
    }

    /// Apply a user edit and re-evaluate the steps.
    pub fn edit(&mut self, f: impl FnOnce(&mut ConfigModel)) -> WizardPhase {
        f(&mut self.config);
        self.graph.observe(&self.config);
        self.phase()
    }

    pub fn current_step(&self) -> usize {
        self.graph.current_step()
    }

    /// Ready only when the last step is validated and the configuration would
    /// be accepted for submission.
    pub fn phase(&self) -> WizardPhase {
        if !self.graph.is_complete() {
            return WizardPhase::Configuring {
                step: self.graph.current_step(),
            };
        }
        if self.config.validate().is_ok() {
            return WizardPhase::ReadyToSubmit;
        }
        // A field the cursor already passed no longer holds.
        let workflow = self.workflow();
        let step = (1..=self.graph.len())
            .find(|&i| {
                workflow
                    .step(i)
                    .is_some_and(|kind| !workflow.is_valid(kind, &self.config))
            })
            .unwrap_or(self.graph.len());
        WizardPhase::Configuring { step }
    }

    pub fn is_rendered(&self, index: usize) -> bool {
        self.graph.is_rendered(index, &self.config)
    }

    pub fn rendered_steps(&self) -> Vec<StepView> {
        self.workflow()
            .steps()
            .iter()
            .enumerate()
            .map(|(i, kind)| (i + 1, *kind))
            .filter(|(index, _)| self.is_rendered(*index))
            .map(|(index, kind)| StepView {
                index,
                kind,
                title: kind.title(),
                valid: self.workflow().is_valid(kind, &self.config),
            })
            .collect()
    }

    /// Hand the configuration over for submission once the last step is validated.
    pub fn finish(&self) -> Result<Submission, WizardError> {
        match self.phase() {
            WizardPhase::Configuring { step } => Err(WizardError::NotReady {
                step,
                title: self
                    .graph
                    .step_kind(step)
                    .map(StepKind::title)
                    .unwrap_or("unknown step"),
            }),
            WizardPhase::ReadyToSubmit => Ok(Submission::new(self.config.clone())?),
        }
    }
}

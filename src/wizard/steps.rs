//! Step catalogue: what each step collects, when it is valid, and where it leads.

use crate::model::{is_blank, ConfigModel};
use serde::{Deserialize, Serialize};

/// Which wizard the user is filling in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum Workflow {
    /// Bounded-random individuals (non-GP).
    #[value(name = "generic")]
    Generic,
    /// Genetic programming over primitive trees.
    #[value(name = "gp")]
    PrimitiveTree,
    /// Feature/model search over a tabular dataset.
    #[value(name = "ml")]
    MachineLearning,
}

const GENERIC_STEPS: [StepKind; 4] = [
    StepKind::Algorithm,
    StepKind::Weights,
    StepKind::RandomGenerator,
    StepKind::IndividualSize,
];

const PRIMITIVE_TREE_STEPS: [StepKind; 6] = [
    StepKind::Algorithm,
    StepKind::PrimitiveSet,
    StepKind::TreeExpression,
    StepKind::IndividualFunction,
    StepKind::PopulationFunction,
    StepKind::Selection,
];

const MACHINE_LEARNING_STEPS: [StepKind; 13] = [
    StepKind::Dataset,
    StepKind::ImportCode,
    StepKind::EvalCode,
    StepKind::Algorithm,
    StepKind::PopulationSize,
    StepKind::Generations,
    StepKind::CrossoverProbability,
    StepKind::MutationProbability,
    StepKind::HallOfFame,
    StepKind::Weights,
    StepKind::Crossover,
    StepKind::Mutation,
    StepKind::Selection,
];

impl Workflow {
    pub fn steps(self) -> &'static [StepKind] {
        match self {
            Workflow::Generic => &GENERIC_STEPS,
            Workflow::PrimitiveTree => &PRIMITIVE_TREE_STEPS,
            Workflow::MachineLearning => &MACHINE_LEARNING_STEPS,
        }
    }

    /// Step at a 1-based index.
    pub fn step(self, index: usize) -> Option<StepKind> {
        index
            .checked_sub(1)
            .and_then(|i| self.steps().get(i))
            .copied()
    }

    /// 1-based index of a step kind in this workflow.
    pub fn position(self, kind: StepKind) -> Option<usize> {
        self.steps().iter().position(|k| *k == kind).map(|i| i + 1)
    }

    /// Readiness: fields of earlier steps that must be present before the step may render.
    pub fn is_ready(self, kind: StepKind, cfg: &ConfigModel) -> bool {
        match (self, kind) {
            (Workflow::Generic, StepKind::RandomGenerator) => {
                cfg.weights_valid() || cfg.algorithm.is_some_and(|a| a.uses_mu_lambda())
            }
            (Workflow::Generic, StepKind::IndividualSize) => cfg
                .random_generator()
                .is_some_and(|g| !is_blank(&g.function) && g.range_ordered()),
            _ => true,
        }
    }

    /// Validity of a step within this workflow.
    ///
    /// Workflows without dedicated steps for the run sizes collect them on the
    /// algorithm step; the tree workflow also takes the fitness weights there.
    pub fn is_valid(self, kind: StepKind, cfg: &ConfigModel) -> bool {
        if !kind.is_valid(cfg) {
            return false;
        }
        match (self, kind) {
            (Workflow::Generic, StepKind::Algorithm) => cfg.run_sizes_ready(),
            (Workflow::PrimitiveTree, StepKind::Algorithm) => {
                cfg.run_sizes_ready() && cfg.objective_ready()
            }
            _ => true,
        }
    }

    /// Copy the fields a step collects in this workflow from `src` into `dst`.
    pub fn copy_fields(self, kind: StepKind, src: &ConfigModel, dst: &mut ConfigModel) {
        kind.copy_fields(src, dst);
        if (self, kind) == (Workflow::PrimitiveTree, StepKind::Algorithm) {
            dst.weights = src.weights.clone();
        }
    }

    /// Where the cursor goes once the step at `index` is valid.
    pub fn next_step(self, index: usize, cfg: &ConfigModel) -> usize {
        match (self, self.step(index)) {
            // μ/λ strategies fix the population structure themselves, so the
            // generic wizard skips the weights gate.
            (Workflow::Generic, Some(StepKind::Algorithm))
                if cfg.algorithm.is_some_and(|a| a.uses_mu_lambda()) =>
            {
                self.position(StepKind::RandomGenerator)
                    .unwrap_or(index + 1)
            }
            _ => index + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    Algorithm,
    Weights,
    RandomGenerator,
    IndividualSize,
    PrimitiveSet,
    TreeExpression,
    IndividualFunction,
    PopulationFunction,
    Selection,
    Dataset,
    ImportCode,
    EvalCode,
    PopulationSize,
    Generations,
    CrossoverProbability,
    MutationProbability,
    HallOfFame,
    Crossover,
    Mutation,
}

impl StepKind {
    pub fn title(self) -> &'static str {
        match self {
            StepKind::Algorithm => "Choose an algorithm",
            StepKind::Weights => "Define fitness weights",
            StepKind::RandomGenerator => "Choose an individual generator and its range",
            StepKind::IndividualSize => "Number of dimensions for the problem (individual size)",
            StepKind::PrimitiveSet => "Build the primitive set",
            StepKind::TreeExpression => "Choose a tree generator expression",
            StepKind::IndividualFunction => "Choose an individual generator function",
            StepKind::PopulationFunction => "Choose a population generator function",
            StepKind::Selection => "Choose a selection function",
            StepKind::Dataset => "Point to the dataset",
            StepKind::ImportCode => "Provide model import code",
            StepKind::EvalCode => "Provide the evaluation function",
            StepKind::PopulationSize => "Population size",
            StepKind::Generations => "Number of generations",
            StepKind::CrossoverProbability => "Crossover probability",
            StepKind::MutationProbability => "Mutation probability",
            StepKind::HallOfFame => "Hall of fame size",
            StepKind::Crossover => "Choose a crossover function",
            StepKind::Mutation => "Choose a mutation function",
        }
    }

    /// Validity of the step's own fields.
    pub fn is_valid(self, cfg: &ConfigModel) -> bool {
        let tree = cfg.tree_generator();
        match self {
            StepKind::Algorithm => cfg.algorithm_ready(),
            StepKind::Weights => cfg.weights_valid(),
            StepKind::RandomGenerator => cfg
                .random_generator()
                .is_some_and(|g| !is_blank(&g.function) && g.range_ordered()),
            StepKind::IndividualSize => cfg
                .random_generator()
                .is_some_and(|g| matches!(g.size, Some(n) if n > 0)),
            StepKind::PrimitiveSet => tree.is_some_and(|t| {
                !t.primitive_set.is_empty()
                    && t.primitive_set.iter().all(|p| !p.name.trim().is_empty())
            }),
            StepKind::TreeExpression => {
                tree.is_some_and(|t| t.expression.is_some() && t.heights_ordered())
            }
            StepKind::IndividualFunction => tree.is_some_and(|t| !is_blank(&t.individual_function)),
            StepKind::PopulationFunction => tree.is_some_and(|t| !is_blank(&t.population_function)),
            StepKind::Selection => cfg.selection_ready(),
            StepKind::Dataset => {
                !is_blank(&cfg.dataset_url)
                    && !is_blank(&cfg.target_column_name)
                    && cfg.sep.as_deref().is_some_and(|s| !s.is_empty())
            }
            StepKind::ImportCode => !is_blank(&cfg.ml_import_code),
            StepKind::EvalCode => !is_blank(&cfg.ml_eval_code),
            StepKind::PopulationSize => matches!(cfg.population_size, Some(n) if n > 0),
            StepKind::Generations => matches!(cfg.generations, Some(n) if n > 0),
            StepKind::CrossoverProbability => is_probability(cfg.cxpb),
            StepKind::MutationProbability => {
                is_probability(cfg.mutpb)
                    && match (cfg.algorithm, cfg.cxpb, cfg.mutpb) {
                        (Some(a), Some(cx), Some(mt)) if a.uses_mu_lambda() => cx + mt <= 1.0,
                        _ => true,
                    }
            }
            StepKind::HallOfFame => matches!(cfg.hof, Some(n) if n > 0),
            StepKind::Crossover => !is_blank(&cfg.crossover_function),
            StepKind::Mutation => !is_blank(&cfg.mutation_function),
        }
    }

    /// Copy the fields this step collects from `src` into `dst`.
    pub fn copy_fields(self, src: &ConfigModel, dst: &mut ConfigModel) {
        match self {
            StepKind::Algorithm => {
                dst.algorithm = src.algorithm;
                dst.mu = src.mu;
                dst.lambda = src.lambda;
                dst.population_size = src.population_size;
                dst.generations = src.generations;
            }
            StepKind::Weights => dst.weights = src.weights.clone(),
            StepKind::RandomGenerator => {
                if let Some(g) = src.random_generator() {
                    let d = dst.random_generator_mut();
                    d.function = g.function.clone();
                    d.range_start = g.range_start;
                    d.range_end = g.range_end;
                }
            }
            StepKind::IndividualSize => {
                if let Some(g) = src.random_generator() {
                    dst.random_generator_mut().size = g.size;
                }
            }
            StepKind::PrimitiveSet => {
                if let Some(t) = src.tree_generator() {
                    dst.tree_generator_mut().primitive_set = t.primitive_set.clone();
                }
            }
            StepKind::TreeExpression => {
                if let Some(t) = src.tree_generator() {
                    let d = dst.tree_generator_mut();
                    d.expression = t.expression;
                    d.min_height = t.min_height;
                    d.max_height = t.max_height;
                }
            }
            StepKind::IndividualFunction => {
                if let Some(t) = src.tree_generator() {
                    dst.tree_generator_mut().individual_function = t.individual_function.clone();
                }
            }
            StepKind::PopulationFunction => {
                if let Some(t) = src.tree_generator() {
                    dst.tree_generator_mut().population_function = t.population_function.clone();
                }
            }
            StepKind::Selection => {
                dst.selection_function = src.selection_function.clone();
                dst.tournament_size = src.tournament_size;
            }
            StepKind::Dataset => {
                dst.dataset_url = src.dataset_url.clone();
                dst.target_column_name = src.target_column_name.clone();
                dst.sep = src.sep.clone();
            }
            StepKind::ImportCode => dst.ml_import_code = src.ml_import_code.clone(),
            StepKind::EvalCode => dst.ml_eval_code = src.ml_eval_code.clone(),
            StepKind::PopulationSize => dst.population_size = src.population_size,
            StepKind::Generations => dst.generations = src.generations,
            StepKind::CrossoverProbability => dst.cxpb = src.cxpb,
            StepKind::MutationProbability => dst.mutpb = src.mutpb,
            StepKind::HallOfFame => dst.hof = src.hof,
            StepKind::Crossover => dst.crossover_function = src.crossover_function.clone(),
            StepKind::Mutation => dst.mutation_function = src.mutation_function.clone(),
        }
    }
}

fn is_probability(p: Option<f64>) -> bool {
    matches!(p, Some(p) if (0.0..=1.0).contains(&p))
}

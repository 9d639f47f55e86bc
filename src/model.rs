use crate::error::ConfigError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Selection operator that needs an explicit tournament size.
pub const TOURNAMENT_SELECTION: &str = "selTournament";

/// Evolutionary strategy driving the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "eaSimple")]
    Simple,
    #[serde(rename = "eaMuPlusLambda")]
    MuPlusLambda,
    #[serde(rename = "eaMuCommaLambda")]
    MuCommaLambda,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [
        Algorithm::Simple,
        Algorithm::MuPlusLambda,
        Algorithm::MuCommaLambda,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Simple => "eaSimple",
            Algorithm::MuPlusLambda => "eaMuPlusLambda",
            Algorithm::MuCommaLambda => "eaMuCommaLambda",
        }
    }

    /// Whether the strategy is parameterised by explicit parent/offspring sizes.
    pub fn uses_mu_lambda(self) -> bool {
        match self {
            Algorithm::Simple => false,
            Algorithm::MuPlusLambda | Algorithm::MuCommaLambda => true,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ConfigError::invalid("algorithm", format!("unknown strategy `{s}`")))
    }
}

/// Tree generation rule for genetic-programming individuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeExpression {
    #[serde(rename = "genFull")]
    Full,
    #[serde(rename = "genGrow")]
    Grow,
    #[serde(rename = "genHalfAndHalf")]
    HalfAndHalf,
}

/// One building block of a primitive set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Primitive {
    pub name: String,
    pub arity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RandomGenerator {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

impl RandomGenerator {
    /// Both range bounds are set, finite, and `start <= end`.
    pub fn range_ordered(&self) -> bool {
        match (self.range_start, self.range_end) {
            (Some(start), Some(end)) => start.is_finite() && end.is_finite() && start <= end,
            _ => false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.function.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingField("individualGenerator.function"));
        }
        if self.range_start.is_none() {
            return Err(ConfigError::MissingField("individualGenerator.rangeStart"));
        }
        if self.range_end.is_none() {
            return Err(ConfigError::MissingField("individualGenerator.rangeEnd"));
        }
        if !self.range_ordered() {
            return Err(ConfigError::invalid(
                "individualGenerator.rangeStart",
                "range start must not exceed range end",
            ));
        }
        require_positive("individualGenerator.size", self.size)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeGenerator {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub primitive_set: Vec<Primitive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<TreeExpression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub individual_function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub population_function: Option<String>,
}

impl TreeGenerator {
    pub fn heights_ordered(&self) -> bool {
        matches!((self.min_height, self.max_height), (Some(min), Some(max)) if min <= max)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primitive_set.is_empty() {
            return Err(ConfigError::MissingField("individualGenerator.primitiveSet"));
        }
        if let Some(p) = self.primitive_set.iter().find(|p| p.name.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "individualGenerator.primitiveSet",
                format!("primitive with arity {} has no name", p.arity),
            ));
        }
        if self.expression.is_none() {
            return Err(ConfigError::MissingField("individualGenerator.expression"));
        }
        if self.min_height.is_none() {
            return Err(ConfigError::MissingField("individualGenerator.minHeight"));
        }
        if self.max_height.is_none() {
            return Err(ConfigError::MissingField("individualGenerator.maxHeight"));
        }
        if !self.heights_ordered() {
            return Err(ConfigError::invalid(
                "individualGenerator.minHeight",
                "min height must not exceed max height",
            ));
        }
        if is_blank(&self.individual_function) {
            return Err(ConfigError::MissingField(
                "individualGenerator.individualFunction",
            ));
        }
        if is_blank(&self.population_function) {
            return Err(ConfigError::MissingField(
                "individualGenerator.populationFunction",
            ));
        }
        Ok(())
    }
}

/// How individuals of the initial population are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IndividualGenerator {
    BoundedRandom(RandomGenerator),
    PrimitiveTree(TreeGenerator),
}

/// Configuration of one evolutionary run, filled in step by step.
///
/// Every field stays `None` (or empty) until the step that collects it has
/// been reached. Serialized as the camelCase JSON body the backend expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<Algorithm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lambda: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub population_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cxpb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutpb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hof: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub weights: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub individual_generator: Option<IndividualGenerator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crossover_function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutation_function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournament_size: Option<u32>,
    #[serde(rename = "datasetURL", skip_serializing_if = "Option::is_none")]
    pub dataset_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_column_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sep: Option<String>,
    #[serde(rename = "mlImportCodeString", skip_serializing_if = "Option::is_none")]
    pub ml_import_code: Option<String>,
    #[serde(
        rename = "mlEvalFunctionCodeString",
        skip_serializing_if = "Option::is_none"
    )]
    pub ml_eval_code: Option<String>,
}

impl ConfigModel {
    pub fn random_generator(&self) -> Option<&RandomGenerator> {
        match &self.individual_generator {
            Some(IndividualGenerator::BoundedRandom(g)) => Some(g),
            _ => None,
        }
    }

    pub fn tree_generator(&self) -> Option<&TreeGenerator> {
        match &self.individual_generator {
            Some(IndividualGenerator::PrimitiveTree(g)) => Some(g),
            _ => None,
        }
    }

    /// Bounded-random generator, replacing any tree generator.
    pub fn random_generator_mut(&mut self) -> &mut RandomGenerator {
        if self.random_generator().is_none() {
            self.individual_generator = Some(IndividualGenerator::BoundedRandom(
                RandomGenerator::default(),
            ));
        }
        match &mut self.individual_generator {
            Some(IndividualGenerator::BoundedRandom(g)) => g,
            _ => unreachable!("bounded-random generator inserted above"),
        }
    }

    /// Tree generator, replacing any bounded-random generator.
    pub fn tree_generator_mut(&mut self) -> &mut TreeGenerator {
        if self.tree_generator().is_none() {
            self.individual_generator =
                Some(IndividualGenerator::PrimitiveTree(TreeGenerator::default()));
        }
        match &mut self.individual_generator {
            Some(IndividualGenerator::PrimitiveTree(g)) => g,
            _ => unreachable!("tree generator inserted above"),
        }
    }

    /// Strategy is chosen and the sizes it needs (if any) are set.
    pub fn algorithm_ready(&self) -> bool {
        match self.algorithm {
            None => false,
            Some(Algorithm::Simple) => true,
            Some(Algorithm::MuPlusLambda) => is_positive(self.mu) && is_positive(self.lambda),
            Some(Algorithm::MuCommaLambda) => {
                matches!((self.mu, self.lambda), (Some(mu), Some(lambda)) if mu > 0 && lambda >= mu)
            }
        }
    }

    /// Generation count is set, and so is the population size unless a μ/λ
    /// strategy fixes it.
    pub fn run_sizes_ready(&self) -> bool {
        let population = self.algorithm.is_some_and(|a| a.uses_mu_lambda())
            || is_positive(self.population_size);
        population && is_positive(self.generations)
    }

    /// Weights are valid, or absent under a μ/λ strategy.
    pub fn objective_ready(&self) -> bool {
        if self.weights.is_empty() {
            self.algorithm.is_some_and(|a| a.uses_mu_lambda())
        } else {
            self.weights_valid()
        }
    }

    pub fn weights_valid(&self) -> bool {
        !self.weights.is_empty() && self.weights.iter().all(|w| w.is_finite() && *w != 0.0)
    }

    pub fn selection_ready(&self) -> bool {
        match self.selection_function.as_deref() {
            None | Some("") => false,
            Some(TOURNAMENT_SELECTION) => is_positive(self.tournament_size),
            Some(_) => true,
        }
    }

    /// Checks everything the backend needs before a run can be created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let algorithm = self
            .algorithm
            .ok_or(ConfigError::MissingField("algorithm"))?;

        match algorithm {
            Algorithm::Simple => {
                require_positive("populationSize", self.population_size)?;
                require_positive("generations", self.generations)?;
            }
            Algorithm::MuPlusLambda | Algorithm::MuCommaLambda => {
                let mu = require_positive("mu", self.mu)?;
                let lambda = require_positive("lambda", self.lambda)?;
                require_positive("generations", self.generations)?;
                if algorithm == Algorithm::MuCommaLambda && lambda < mu {
                    return Err(ConfigError::invalid(
                        "lambda",
                        "must be at least mu for eaMuCommaLambda",
                    ));
                }
            }
        }

        // μ/λ strategies may leave weights unset; the backend then assumes a
        // single maximised objective.
        if self.weights.is_empty() {
            if !algorithm.uses_mu_lambda() {
                return Err(ConfigError::MissingField("weights"));
            }
        } else if !self.weights_valid() {
            return Err(ConfigError::invalid(
                "weights",
                "every weight must be finite and non-zero",
            ));
        }

        for (field, p) in [("cxpb", self.cxpb), ("mutpb", self.mutpb)] {
            if let Some(p) = p {
                if !(0.0..=1.0).contains(&p) {
                    return Err(ConfigError::invalid(field, "probability must be within [0, 1]"));
                }
            }
        }
        if algorithm.uses_mu_lambda() {
            if let (Some(cx), Some(mt)) = (self.cxpb, self.mutpb) {
                if cx + mt > 1.0 {
                    return Err(ConfigError::invalid(
                        "mutpb",
                        "cxpb + mutpb must not exceed 1.0 for mu/lambda strategies",
                    ));
                }
            }
        }

        match &self.individual_generator {
            Some(IndividualGenerator::BoundedRandom(g)) => g.validate()?,
            Some(IndividualGenerator::PrimitiveTree(g)) => g.validate()?,
            None => {}
        }

        if self.selection_function.as_deref() == Some(TOURNAMENT_SELECTION) {
            require_positive("tournamentSize", self.tournament_size)?;
        }
        Ok(())
    }
}

fn is_positive(v: Option<u32>) -> bool {
    matches!(v, Some(n) if n > 0)
}

pub(crate) fn is_blank(v: &Option<String>) -> bool {
    v.as_deref().map_or(true, |s| s.trim().is_empty())
}

fn require_positive(field: &'static str, v: Option<u32>) -> Result<u32, ConfigError> {
    match v {
        None => Err(ConfigError::MissingField(field)),
        Some(0) => Err(ConfigError::invalid(field, "must be a positive integer")),
        Some(n) => Ok(n),
    }
}

/// Backend-assigned run identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    #[serde(rename = "error")]
    Errored,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// Apply an observation: `Running` may move to a terminal state, terminal
    /// states never change.
    pub fn advance(self, observed: RunStatus) -> RunStatus {
        if self.is_terminal() {
            self
        } else {
            observed
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Running => "Running",
            RunStatus::Completed => "Completed",
            RunStatus::Errored => "Error",
        })
    }
}

/// Point-in-time view of a run as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub status: RunStatus,
    /// Remaining fields of the backend payload, kept verbatim.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl RunRecord {
    pub fn new(id: RunId, status: RunStatus) -> Self {
        Self {
            id,
            status,
            detail: serde_json::Value::Null,
        }
    }

    /// Backend-provided explanation, if the payload carries one.
    pub fn message(&self) -> Option<&str> {
        ["message", "error"]
            .iter()
            .find_map(|k| self.detail.get(k).and_then(|v| v.as_str()))
    }
}

/// A validated configuration plus the idempotency key reused on every retry.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub config: ConfigModel,
    pub idempotency_key: String,
}

impl Submission {
    pub fn new(config: ConfigModel) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            idempotency_key: gen_idempotency_key(),
        })
    }
}

/// Generate a random key identifying one logical submission.
fn gen_idempotency_key() -> String {
    let mut b = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut b);
    b.iter().map(|x| format!("{x:02x}")).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRequest {
    #[serde(rename = "runID")]
    pub run_id: RunId,
    #[serde(rename = "userEmailList")]
    pub recipients: Vec<String>,
}

/// Raw share response before it is mapped to an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareReceipt {
    pub run_id: RunId,
    pub recipients: Vec<String>,
}

/// Artifacts the backend publishes for a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactKind {
    InputConfig,
    SourceListing,
    Logbook,
    Best,
    FitnessPlot,
}

/// How an artifact's body is turned into content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoding {
    Structured,
    Text,
    Reference,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::InputConfig,
        ArtifactKind::SourceListing,
        ArtifactKind::Logbook,
        ArtifactKind::Best,
        ArtifactKind::FitnessPlot,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::InputConfig => "input.json",
            ArtifactKind::SourceListing => "code.py",
            ArtifactKind::Logbook => "logbook.txt",
            ArtifactKind::Best => "best.txt",
            ArtifactKind::FitnessPlot => "fitness_plot.png",
        }
    }

    pub fn decoding(self) -> Decoding {
        match self {
            ArtifactKind::InputConfig => Decoding::Structured,
            ArtifactKind::SourceListing | ArtifactKind::Logbook | ArtifactKind::Best => {
                Decoding::Text
            }
            ArtifactKind::FitnessPlot => Decoding::Reference,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::InputConfig => "input configuration",
            ArtifactKind::SourceListing => "source listing",
            ArtifactKind::Logbook => "logbook",
            ArtifactKind::Best => "best individual",
            ArtifactKind::FitnessPlot => "fitness plot",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ArtifactContent {
    Structured(serde_json::Value),
    Text(String),
    /// Location of a binary artifact; the bytes are not loaded.
    Reference(String),
}

impl ArtifactContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArtifactContent::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            ArtifactContent::Structured(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&str> {
        match self {
            ArtifactContent::Reference(url) => Some(url),
            _ => None,
        }
    }
}

/// How tracking of a run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RunOutcome {
    Completed,
    /// The backend reported the run as failed.
    Errored { message: Option<String> },
    /// A status query failed in transport; tracking stopped.
    QueryFailed { message: String },
    TimedOut { attempts: u32, elapsed_ms: u64 },
    Cancelled { attempts: u32 },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrackEvent {
    Submitted {
        record: RunRecord,
    },
    SubmissionFailed {
        message: String,
    },
    StatusObserved {
        record: RunRecord,
        attempt: u32,
    },
    Finished {
        outcome: RunOutcome,
    },
    ArtifactReady {
        kind: ArtifactKind,
        content: ArtifactContent,
    },
    ArtifactFailed {
        kind: ArtifactKind,
        message: String,
    },
    Info(InfoEvent),
}

/// Structured info events emitted by the tracker and consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    Cancelling,
    NextPoll { attempt: u32, delay_ms: u64 },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Cancelling => "Cancelling…".to_string(),
            InfoEvent::NextPoll { attempt, delay_ms } => {
                format!("Still running after {attempt} checks, next check in {delay_ms} ms")
            }
        }
    }
}

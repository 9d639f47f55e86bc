//! Error types for configuration, submission, polling, artifact retrieval and sharing.
//!
//! Transport failures are converted into these values where the call is made,
//! so callers always receive a typed outcome rather than a raw `reqwest::Error`.

use crate::model::ArtifactKind;
use thiserror::Error;

/// A configuration that cannot be submitted as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A field required by the chosen strategy or workflow is missing.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but violates its constraint.
    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// The wizard could not hand a configuration over for submission.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WizardError {
    /// Step `step` is still the active one; the final step has not been validated.
    #[error("wizard is still configuring step {step} ({title})")]
    NotReady { step: usize, title: &'static str },

    #[error("configuration incomplete: {0}")]
    Incomplete(#[from] ConfigError),
}

/// Failure to create a run.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("configuration rejected before sending: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("network error while submitting run: {0}")]
    Transport(String),

    /// The backend answered with a non-2xx status.
    #[error("backend rejected submission (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("could not decode submission response: {0}")]
    Decode(String),
}

/// Failure of a single status query. Distinct from a backend-reported errored run.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("network error while querying run status: {0}")]
    Transport(String),

    #[error("status query returned HTTP {status}")]
    Status { status: u16 },

    #[error("could not decode status response: {0}")]
    Decode(String),
}

/// Failure to retrieve one artifact. Never affects the other artifacts of the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArtifactFetchError {
    /// Artifacts are only read after a completed observation.
    #[error("run {run_id} is not completed; artifacts are unavailable")]
    RunNotCompleted { run_id: String },

    #[error("no object location for {kind}: {message}")]
    Location { kind: ArtifactKind, message: String },

    #[error("network error while fetching {kind}: {message}")]
    Transport { kind: ArtifactKind, message: String },

    #[error("object store returned HTTP {status} for {kind}")]
    Status { kind: ArtifactKind, status: u16 },

    #[error("could not decode {kind}: {message}")]
    Decode { kind: ArtifactKind, message: String },
}

/// Failure to share a run, mapped from the backend response code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShareError {
    #[error("no recipients given")]
    NoRecipients,

    /// HTTP 401.
    #[error("unauthorized to share this run")]
    Unauthorized,

    /// HTTP 400; `message` is the backend's text, unmodified.
    #[error("{message}")]
    Rejected { message: String },

    #[error("unexpected response from backend (HTTP {status})")]
    Unexpected { status: u16 },

    #[error("network error while sharing run: {0}")]
    Transport(String),
}

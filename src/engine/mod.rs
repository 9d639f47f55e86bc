//! Run tracking: submission, status polling, artifact retrieval and sharing.
//!
//! The tracking logic talks to the outside world through two seams,
//! [`RunBackend`] (the execution backend API) and [`ArtifactSource`] (the
//! object store). [`RunClient`] and [`ArtifactStore`] are their HTTP
//! implementations; `crate::fakes` provides in-memory ones.

mod artifacts;
mod client;
mod poller;
mod share;
mod store;
mod task;

pub use artifacts::{ArtifactFetcher, ArtifactReport};
pub use client::RunClient;
pub use poller::{PollOutcome, RunPoller};
pub use share::{split_recipients, ShareService};
pub use store::ArtifactStore;
pub use task::{CancelSignal, CancelSource, TaskHandle};

use crate::error::{ArtifactFetchError, QueryError, ShareError, SubmissionError};
use crate::model::{ArtifactContent, ArtifactKind, RunId, RunRecord, ShareReply, ShareRequest, Submission};
use async_trait::async_trait;
use bytes::Bytes;

/// The execution backend's run API.
#[async_trait]
pub trait RunBackend: Send + Sync {
    /// Create a run. The backend assigns the identifier.
    async fn submit(&self, submission: &Submission) -> Result<RunRecord, SubmissionError>;

    /// Point-in-time status read. The returned record always carries `run_id`.
    async fn query_status(&self, run_id: &RunId) -> Result<RunRecord, QueryError>;

    /// Send a share request and return the raw response for mapping.
    async fn share(&self, request: &ShareRequest) -> Result<ShareReply, ShareError>;
}

/// Read access to the artifacts published for a run.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Fetch and decode one artifact according to its kind.
    async fn fetch(
        &self,
        run_id: &RunId,
        kind: ArtifactKind,
    ) -> Result<ArtifactContent, ArtifactFetchError>;

    /// Raw bytes of an artifact, for saving it locally.
    async fn download(&self, run_id: &RunId, kind: ArtifactKind)
        -> Result<Bytes, ArtifactFetchError>;
}

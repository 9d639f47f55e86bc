//! In-memory fakes for the tracking seams (testing only)
//!
//! `ScriptedBackend` implements [`RunBackend`] from a script of status
//! responses; `MemoryArtifactStore` implements [`ArtifactSource`] from a map
//! of stored objects. Both record the calls they receive.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use crate::engine::{ArtifactSource, RunBackend};
use crate::error::{ArtifactFetchError, QueryError, ShareError, SubmissionError};
use crate::model::{
    ArtifactContent, ArtifactKind, RunId, RunRecord, RunStatus, ShareReply, ShareRequest,
    Submission,
};

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// One scripted answer to a status query.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusStep {
    Running,
    Completed,
    Errored(Option<String>),
    /// The query fails in transport.
    Unreachable(String),
    /// The query gets a non-2xx response.
    HttpStatus(u16),
}

/// Backend whose status answers follow a script. The last step repeats once
/// the script is exhausted.
#[derive(Debug)]
pub struct ScriptedBackend {
    run_id: RunId,
    script: Mutex<VecDeque<StatusStep>>,
    last: Mutex<StatusStep>,
    latency: Duration,
    queries: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    submissions: Mutex<Vec<Submission>>,
    accepted_keys: Mutex<HashMap<String, RunId>>,
    reject_submit: Mutex<Option<(u16, String)>>,
    share_replies: Mutex<VecDeque<Result<ShareReply, ShareError>>>,
    shares: Mutex<Vec<ShareRequest>>,
}

impl ScriptedBackend {
    pub fn new(run_id: &str, script: impl IntoIterator<Item = StatusStep>) -> Self {
        Self {
            run_id: RunId::new(run_id),
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(StatusStep::Running),
            latency: Duration::ZERO,
            queries: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            accepted_keys: Mutex::new(HashMap::new()),
            reject_submit: Mutex::new(None),
            share_replies: Mutex::new(VecDeque::new()),
            shares: Mutex::new(Vec::new()),
        }
    }

    /// `running` Running answers followed by Completed.
    pub fn completing_after(run_id: &str, running: usize) -> Self {
        let mut script = vec![StatusStep::Running; running];
        script.push(StatusStep::Completed);
        Self::new(run_id, script)
    }

    /// Every status query takes `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer every submission with a non-2xx status.
    pub fn rejecting_submissions(self, status: u16, message: &str) -> Self {
        *self.reject_submit.lock().unwrap() = Some((status, message.to_string()));
        self
    }

    /// Queue a raw share response; unqueued shares get a 200.
    pub fn push_share_reply(&self, status: u16, body: &str) {
        self.share_replies.lock().unwrap().push_back(Ok(ShareReply {
            status,
            body: body.to_string(),
        }));
    }

    pub fn push_share_failure(&self, message: &str) {
        self.share_replies
            .lock()
            .unwrap()
            .push_back(Err(ShareError::Transport(message.to_string())));
    }

    pub fn query_count(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }

    /// Highest number of status queries observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn shares(&self) -> Vec<ShareRequest> {
        self.shares.lock().unwrap().clone()
    }

    fn next_step(&self) -> StatusStep {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = script.pop_front() {
            *last = step;
        }
        last.clone()
    }
}

#[async_trait]
impl RunBackend for ScriptedBackend {
    async fn submit(&self, submission: &Submission) -> Result<RunRecord, SubmissionError> {
        submission.config.validate()?;
        self.submissions.lock().unwrap().push(submission.clone());
        if let Some((status, message)) = self.reject_submit.lock().unwrap().clone() {
            return Err(SubmissionError::Rejected { status, message });
        }
        // A retried submission maps to the run its key already created.
        let mut keys = self.accepted_keys.lock().unwrap();
        let id = keys
            .entry(submission.idempotency_key.clone())
            .or_insert_with(|| self.run_id.clone())
            .clone();
        Ok(RunRecord::new(id, RunStatus::Running))
    }

    async fn query_status(&self, run_id: &RunId) -> Result<RunRecord, QueryError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
        let step = self.next_step();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut record = RunRecord::new(run_id.clone(), RunStatus::Running);
        match step {
            StatusStep::Running => {}
            StatusStep::Completed => record.status = RunStatus::Completed,
            StatusStep::Errored(message) => {
                record.status = RunStatus::Errored;
                if let Some(m) = message {
                    record.detail = json!({ "message": m });
                }
            }
            StatusStep::Unreachable(message) => return Err(QueryError::Transport(message)),
            StatusStep::HttpStatus(status) => return Err(QueryError::Status { status }),
        }
        Ok(record)
    }

    async fn share(&self, request: &ShareRequest) -> Result<ShareReply, ShareError> {
        self.shares.lock().unwrap().push(request.clone());
        self.share_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ShareReply {
                    status: 200,
                    body: "{}".to_string(),
                })
            })
    }
}

// ---------------------------------------------------------------------------
// MemoryArtifactStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredObject {
    content: ArtifactContent,
    bytes: Bytes,
}

/// In-memory object store keyed by `(run, kind)`. Missing objects answer 404.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<HashMap<(RunId, ArtifactKind), StoredObject>>,
    failures: Mutex<HashMap<(RunId, ArtifactKind), (u16, u32)>>,
    calls: Mutex<Vec<(RunId, ArtifactKind)>>,
    latency: Duration,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request takes this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn respond(&self) {
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Store the five artifacts a finished run publishes, with sample content.
    pub fn with_completed_run(self, run_id: &str) -> Self {
        let id = RunId::new(run_id);
        self.insert_text(&id, ArtifactKind::SourceListing, "from deap import base\n");
        self.insert_text(
            &id,
            ArtifactKind::Logbook,
            "gen\tnevals\tavg\tmin\tmax\n0\t50\t1.5\t0.2\t3.1\n1\t38\t1.1\t0.1\t2.7\n",
        );
        self.insert_text(&id, ArtifactKind::Best, "[0.12, 0.98, 0.33]\n");
        self.insert(
            &id,
            ArtifactKind::InputConfig,
            ArtifactContent::Structured(json!({ "algorithm": "eaSimple", "populationSize": 50 })),
            Bytes::from_static(br#"{"algorithm":"eaSimple","populationSize":50}"#),
        );
        self.insert(
            &id,
            ArtifactKind::FitnessPlot,
            ArtifactContent::Reference(format!("memory://code/{run_id}/fitness_plot.png")),
            Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
        );
        self
    }

    pub fn insert(&self, run_id: &RunId, kind: ArtifactKind, content: ArtifactContent, bytes: Bytes) {
        self.objects
            .lock()
            .unwrap()
            .insert((run_id.clone(), kind), StoredObject { content, bytes });
    }

    pub fn insert_text(&self, run_id: &RunId, kind: ArtifactKind, text: &str) {
        self.insert(
            run_id,
            kind,
            ArtifactContent::Text(text.to_string()),
            Bytes::copy_from_slice(text.as_bytes()),
        );
    }

    pub fn remove(&self, run_id: &RunId, kind: ArtifactKind) {
        self.objects.lock().unwrap().remove(&(run_id.clone(), kind));
    }

    /// The next `times` requests for the object answer with `status`.
    pub fn fail_times(&self, run_id: &RunId, kind: ArtifactKind, status: u16, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert((run_id.clone(), kind), (status, times));
    }

    pub fn call_count(&self, kind: ArtifactKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, k)| *k == kind)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn lookup(&self, run_id: &RunId, kind: ArtifactKind) -> Result<StoredObject, ArtifactFetchError> {
        let key = (run_id.clone(), kind);
        self.calls.lock().unwrap().push(key.clone());

        let mut failures = self.failures.lock().unwrap();
        if let Some((status, remaining)) = failures.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ArtifactFetchError::Status {
                    kind,
                    status: *status,
                });
            }
        }
        drop(failures);

        self.objects
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(ArtifactFetchError::Status { kind, status: 404 })
    }
}

#[async_trait]
impl ArtifactSource for MemoryArtifactStore {
    async fn fetch(
        &self,
        run_id: &RunId,
        kind: ArtifactKind,
    ) -> Result<ArtifactContent, ArtifactFetchError> {
        self.respond().await;
        self.lookup(run_id, kind).map(|o| o.content)
    }

    async fn download(&self, run_id: &RunId, kind: ArtifactKind) -> Result<Bytes, ArtifactFetchError> {
        self.respond().await;
        self.lookup(run_id, kind).map(|o| o.bytes)
    }
}

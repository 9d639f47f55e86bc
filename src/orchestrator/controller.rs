//! Run lifecycle controller.
//!
//! Owns submit/poll/fetch orchestration for one run and emits events for presentation layers.

use crate::engine::{
    ArtifactFetcher, ArtifactReport, ArtifactSource, PollOutcome, RunBackend, RunPoller,
    TaskHandle,
};
use crate::config::PollPolicy;
use crate::model::{
    ArtifactContent, ArtifactKind, InfoEvent, RunId, RunOutcome, RunRecord, Submission,
    TrackEvent,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinError;
use tokio::time::Duration;
use tracing::{debug, info};

/// Commands emitted by UI layers to control the tracked run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    /// Stop tracking; pending work is dropped.
    Cancel,
    /// Same as `Cancel`, sent when the whole program is shutting down.
    Quit,
}

/// How a tracking session begins.
#[derive(Debug, Clone)]
pub enum RunStart {
    Submit(Submission),
    /// Resume tracking a run that was submitted earlier.
    Attach(RunId),
}

/// The seams a controller works through.
#[derive(Clone)]
pub struct Tracker {
    backend: Arc<dyn RunBackend>,
    poller: RunPoller,
    fetcher: ArtifactFetcher,
}

impl Tracker {
    pub fn new(
        backend: Arc<dyn RunBackend>,
        source: Arc<dyn ArtifactSource>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            poller: RunPoller::new(backend.clone(), policy),
            fetcher: ArtifactFetcher::new(source),
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<dyn RunBackend> {
        &self.backend
    }

    pub fn fetcher(&self) -> &ArtifactFetcher {
        &self.fetcher
    }
}

/// Everything learnt about a run during one tracking session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedRun {
    pub run_id: Option<RunId>,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_error: Option<String>,
    pub last_record: Option<RunRecord>,
    pub attempts: u32,
    pub outcome: Option<RunOutcome>,
    pub artifacts: BTreeMap<ArtifactKind, ArtifactContent>,
    pub artifact_failures: BTreeMap<ArtifactKind, String>,
}

impl TrackedRun {
    fn new() -> Self {
        Self {
            run_id: None,
            started_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            submission_error: None,
            last_record: None,
            attempts: 0,
            outcome: None,
            artifacts: BTreeMap::new(),
            artifact_failures: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.as_ref().is_some_and(RunOutcome::is_success)
    }

    fn absorb(&mut self, report: ArtifactReport) {
        self.artifacts = report.artifacts;
        self.artifact_failures = report
            .failures
            .into_iter()
            .map(|(k, e)| (k, e.to_string()))
            .collect();
    }
}

/// Waits on a task while listening for UI commands.
///
/// Cancellation is cooperative: the task is signalled and then awaited so it
/// can report how far it got.
async fn drive<T: Send + 'static>(
    mut task: TaskHandle<T>,
    cmd_rx: &mut UnboundedReceiver<UiCommand>,
    event_tx: &UnboundedSender<TrackEvent>,
) -> Result<T, JoinError> {
    let mut cancelled = false;
    let mut commands_open = true;
    // Cancel watchdog: if a cancel takes too long, emit a status message to keep UI feedback alive.
    let mut cancel_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if commands_open => {
                // A closed command channel means the UI is gone; treat it as a quit.
                if cmd.is_none() {
                    commands_open = false;
                }
                if !cancelled {
                    cancelled = true;
                    task.cancel();
                    let _ = event_tx.send(TrackEvent::Info(InfoEvent::Cancelling));
                    cancel_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
                }
            }
            res = task.join() => {
                return res;
            }
            _ = watchdog.tick() => {
                if let Some(deadline) = cancel_deadline {
                    if tokio::time::Instant::now() >= deadline {
                        let _ = event_tx.send(TrackEvent::Info(InfoEvent::Message(
                            "Still cancelling…".into(),
                        )));
                        cancel_deadline = None;
                    }
                }
            }
        }
    }
}

/// Track one run from start to finish and emit events back to presentation layers.
///
/// Artifacts are fetched only when `fetch_artifacts` is set and the run was
/// observed as completed.
pub async fn run_controller(
    tracker: &Tracker,
    start: RunStart,
    fetch_artifacts: bool,
    event_tx: UnboundedSender<TrackEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> TrackedRun {
    let mut tracked = TrackedRun::new();

    let run_id = match start {
        RunStart::Attach(id) => id,
        RunStart::Submit(submission) => {
            let backend = tracker.backend.clone();
            let task = TaskHandle::spawn(move |mut cancel| async move {
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    res = backend.submit(&submission) => Some(res),
                }
            });
            match drive(task, &mut cmd_rx, &event_tx).await {
                Ok(Some(Ok(record))) => {
                    let _ = event_tx.send(TrackEvent::Submitted {
                        record: record.clone(),
                    });
                    let id = record.id.clone();
                    tracked.last_record = Some(record);
                    id
                }
                Ok(Some(Err(e))) => {
                    let message = e.to_string();
                    let _ = event_tx.send(TrackEvent::SubmissionFailed {
                        message: message.clone(),
                    });
                    tracked.submission_error = Some(message);
                    return tracked;
                }
                Ok(None) => {
                    let outcome = RunOutcome::Cancelled { attempts: 0 };
                    let _ = event_tx.send(TrackEvent::Finished {
                        outcome: outcome.clone(),
                    });
                    tracked.outcome = Some(outcome);
                    return tracked;
                }
                Err(e) => {
                    let message = format!("submission task failed: {e}");
                    let _ = event_tx.send(TrackEvent::SubmissionFailed {
                        message: message.clone(),
                    });
                    tracked.submission_error = Some(message);
                    return tracked;
                }
            }
        }
    };
    tracked.run_id = Some(run_id.clone());
    info!(run_id = %run_id, "tracking run");

    let poller = tracker.poller.clone();
    let poll_tx = event_tx.clone();
    let poll_id = run_id.clone();
    let task = TaskHandle::spawn(move |cancel| async move {
        poller.poll_with_events(&poll_id, cancel, Some(&poll_tx)).await
    });
    let outcome = match drive(task, &mut cmd_rx, &event_tx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let _ = event_tx.send(TrackEvent::Info(InfoEvent::Message(format!(
                "Polling task failed: {e}"
            ))));
            let summary = RunOutcome::QueryFailed {
                message: e.to_string(),
            };
            let _ = event_tx.send(TrackEvent::Finished {
                outcome: summary.clone(),
            });
            tracked.outcome = Some(summary);
            return tracked;
        }
    };

    tracked.attempts = outcome.attempts();
    let summary = outcome.summary();
    let _ = event_tx.send(TrackEvent::Finished {
        outcome: summary.clone(),
    });
    tracked.outcome = Some(summary);

    let record = match outcome {
        PollOutcome::Completed { record, .. } => record,
        PollOutcome::Errored { record, .. } => {
            tracked.last_record = Some(record);
            return tracked;
        }
        _ => return tracked,
    };
    tracked.last_record = Some(record.clone());

    if !fetch_artifacts {
        debug!("artifact fetch skipped");
        return tracked;
    }

    let fetcher = tracker.fetcher.clone();
    let task = TaskHandle::spawn(move |mut cancel| async move {
        tokio::select! {
            _ = cancel.cancelled() => None,
            res = fetcher.fetch_all(&record) => Some(res),
        }
    });
    match drive(task, &mut cmd_rx, &event_tx).await {
        Ok(Some(Ok(report))) => {
            for (kind, content) in &report.artifacts {
                let _ = event_tx.send(TrackEvent::ArtifactReady {
                    kind: *kind,
                    content: content.clone(),
                });
            }
            for (kind, err) in &report.failures {
                let _ = event_tx.send(TrackEvent::ArtifactFailed {
                    kind: *kind,
                    message: err.to_string(),
                });
            }
            tracked.absorb(report);
        }
        Ok(Some(Err(e))) => {
            let _ = event_tx.send(TrackEvent::Info(InfoEvent::Message(format!(
                "Artifacts unavailable: {e}"
            ))));
        }
        Ok(None) => {
            let _ = event_tx.send(TrackEvent::Info(InfoEvent::Message(
                "Artifact retrieval cancelled".into(),
            )));
        }
        Err(e) => {
            let _ = event_tx.send(TrackEvent::Info(InfoEvent::Message(format!(
                "Artifact task failed: {e}"
            ))));
        }
    }

    tracked
}

use super::task::CancelSignal;
use super::RunBackend;
use crate::config::PollPolicy;
use crate::error::QueryError;
use crate::model::{InfoEvent, RunId, RunOutcome, RunRecord, RunStatus, TrackEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Terminal result of polling one run.
#[derive(Debug)]
pub enum PollOutcome {
    Completed { record: RunRecord, attempts: u32 },
    /// The backend reported the run itself as failed.
    Errored { record: RunRecord, attempts: u32 },
    /// A status query failed; polling does not retry.
    QueryFailed { attempts: u32, error: QueryError },
    /// The attempt or wall-clock limit was reached while the run was still running.
    TimedOut { attempts: u32, elapsed: Duration },
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    pub fn record(&self) -> Option<&RunRecord> {
        match self {
            PollOutcome::Completed { record, .. } | PollOutcome::Errored { record, .. } => {
                Some(record)
            }
            _ => None,
        }
    }

    /// Number of status queries issued.
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Completed { attempts, .. }
            | PollOutcome::Errored { attempts, .. }
            | PollOutcome::QueryFailed { attempts, .. }
            | PollOutcome::TimedOut { attempts, .. }
            | PollOutcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PollOutcome::Completed { .. })
    }

    /// Serializable summary for events and reports.
    pub fn summary(&self) -> RunOutcome {
        match self {
            PollOutcome::Completed { .. } => RunOutcome::Completed,
            PollOutcome::Errored { record, .. } => RunOutcome::Errored {
                message: record.message().map(str::to_string),
            },
            PollOutcome::QueryFailed { error, .. } => RunOutcome::QueryFailed {
                message: error.to_string(),
            },
            PollOutcome::TimedOut { attempts, elapsed } => RunOutcome::TimedOut {
                attempts: *attempts,
                elapsed_ms: elapsed.as_millis() as u64,
            },
            PollOutcome::Cancelled { attempts } => RunOutcome::Cancelled {
                attempts: *attempts,
            },
        }
    }
}

/// Drives a submitted run to a terminal state by re-issuing the status query.
///
/// Queries for a run are strictly sequential: the next one is only scheduled
/// after the previous result has been observed.
#[derive(Clone)]
pub struct RunPoller {
    backend: Arc<dyn RunBackend>,
    policy: PollPolicy,
}

impl RunPoller {
    pub fn new(backend: Arc<dyn RunBackend>, policy: PollPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub async fn poll(&self, run_id: &RunId, cancel: CancelSignal) -> PollOutcome {
        self.poll_with_events(run_id, cancel, None).await
    }

    /// Poll until terminal, reporting each observation on `event_tx`.
    #[instrument(skip(self, run_id, cancel, event_tx), fields(run_id = %run_id))]
    pub async fn poll_with_events(
        &self,
        run_id: &RunId,
        mut cancel: CancelSignal,
        event_tx: Option<&UnboundedSender<TrackEvent>>,
    ) -> PollOutcome {
        let emit = |ev: TrackEvent| {
            if let Some(tx) = event_tx {
                let _ = tx.send(ev);
            }
        };
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled { attempts };
            }
            attempts += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(attempts, "polling cancelled during query");
                    return PollOutcome::Cancelled { attempts };
                }
                r = self.backend.query_status(run_id) => r,
            };

            let record = match result {
                Ok(record) => record,
                Err(error) => {
                    warn!(attempts, error = %error, "status query failed, giving up");
                    return PollOutcome::QueryFailed { attempts, error };
                }
            };
            emit(TrackEvent::StatusObserved {
                record: record.clone(),
                attempt: attempts,
            });

            match record.status {
                RunStatus::Completed => {
                    info!(attempts, "run completed");
                    return PollOutcome::Completed { record, attempts };
                }
                RunStatus::Errored => {
                    warn!(attempts, message = record.message().unwrap_or("-"), "run errored");
                    return PollOutcome::Errored { record, attempts };
                }
                RunStatus::Running => {}
            }

            if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
                warn!(attempts, "attempt limit reached");
                return PollOutcome::TimedOut {
                    attempts,
                    elapsed: start.elapsed(),
                };
            }

            let delay = match self.policy.timeout {
                Some(limit) => {
                    let elapsed = start.elapsed();
                    if elapsed >= limit {
                        warn!(attempts, "polling timeout reached");
                        return PollOutcome::TimedOut { attempts, elapsed };
                    }
                    self.policy.interval.min(limit - elapsed)
                }
                None => self.policy.interval,
            };

            emit(TrackEvent::Info(InfoEvent::NextPoll {
                attempt: attempts,
                delay_ms: delay.as_millis() as u64,
            }));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(attempts, "polling cancelled while waiting");
                    return PollOutcome::Cancelled { attempts };
                }
                _ = tokio::time::sleep(delay) => {}
            }

            if let Some(limit) = self.policy.timeout {
                let elapsed = start.elapsed();
                if elapsed >= limit {
                    warn!(attempts, "polling timeout reached");
                    return PollOutcome::TimedOut { attempts, elapsed };
                }
            }
        }
    }
}

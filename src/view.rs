//! Presentation-neutral state for a tracked run.
//!
//! `RunView` folds `TrackEvent`s into what a result screen shows: a status
//! banner, the artifact panels for the current `ViewMode`, and the share form.

use crate::engine::split_recipients;
use crate::error::ShareError;
use crate::model::{
    ArtifactContent, ArtifactKind, InfoEvent, RunId, RunOutcome, RunStatus, ShareReceipt,
    ShareRequest, TrackEvent,
};
use std::collections::{BTreeMap, BTreeSet};

/// Which artifacts the result screen shows. Exactly one mode is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Summary,
    Code,
    Logs,
}

impl ViewMode {
    pub fn kinds(self) -> &'static [ArtifactKind] {
        match self {
            ViewMode::Summary => &[
                ArtifactKind::InputConfig,
                ArtifactKind::Best,
                ArtifactKind::FitnessPlot,
            ],
            ViewMode::Code => &[ArtifactKind::SourceListing],
            ViewMode::Logs => &[ArtifactKind::Logbook],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DisplayStatus {
    #[default]
    Idle,
    Submitting,
    SubmissionFailed(String),
    Running { attempts: u32 },
    Completed,
    Errored(Option<String>),
    QueryFailed(String),
    TimedOut { attempts: u32 },
    Cancelling,
    Cancelled,
}

impl DisplayStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DisplayStatus::SubmissionFailed(_)
                | DisplayStatus::Completed
                | DisplayStatus::Errored(_)
                | DisplayStatus::QueryFailed(_)
                | DisplayStatus::TimedOut { .. }
                | DisplayStatus::Cancelled
        )
    }

    pub fn banner(&self) -> String {
        match self {
            DisplayStatus::Idle => "Idle".into(),
            DisplayStatus::Submitting => "Submitting…".into(),
            DisplayStatus::SubmissionFailed(m) => format!("Submission failed: {m}"),
            DisplayStatus::Running { attempts } => format!("Running ({attempts} checks)"),
            DisplayStatus::Completed => "Completed".into(),
            DisplayStatus::Errored(Some(m)) => format!("Run failed: {m}"),
            DisplayStatus::Errored(None) => "Run failed".into(),
            DisplayStatus::QueryFailed(m) => format!("Status unavailable: {m}"),
            DisplayStatus::TimedOut { attempts } => {
                format!("Gave up waiting after {attempts} checks")
            }
            DisplayStatus::Cancelling => "Cancelling…".into(),
            DisplayStatus::Cancelled => "Cancelled".into(),
        }
    }
}

/// Share dialog state. Input survives until the backend has answered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ShareForm {
    #[default]
    Closed,
    Editing {
        input: String,
        error: Option<String>,
    },
    Pending {
        input: String,
    },
}

impl ShareForm {
    pub fn input(&self) -> Option<&str> {
        match self {
            ShareForm::Closed => None,
            ShareForm::Editing { input, .. } | ShareForm::Pending { input } => Some(input),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ShareForm::Pending { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunView {
    run_id: Option<RunId>,
    status: DisplayStatus,
    mode: ViewMode,
    artifacts: BTreeMap<ArtifactKind, ArtifactContent>,
    failed: BTreeSet<ArtifactKind>,
    share: ShareForm,
    notice: Option<String>,
}

impl RunView {
    pub fn new() -> Self {
        Self::default()
    }

    /// A view for a run that is being submitted now.
    pub fn submitting() -> Self {
        Self {
            status: DisplayStatus::Submitting,
            ..Self::default()
        }
    }

    pub fn attached(run_id: RunId) -> Self {
        Self {
            run_id: Some(run_id),
            status: DisplayStatus::Running { attempts: 0 },
            ..Self::default()
        }
    }

    pub fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    pub fn status(&self) -> &DisplayStatus {
        &self.status
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn share_form(&self) -> &ShareForm {
        &self.share
    }

    pub fn apply(&mut self, event: &TrackEvent) {
        match event {
            TrackEvent::Submitted { record } => {
                self.run_id = Some(record.id.clone());
                self.status = DisplayStatus::Running { attempts: 0 };
            }
            TrackEvent::SubmissionFailed { message } => {
                self.status = DisplayStatus::SubmissionFailed(message.clone());
            }
            TrackEvent::StatusObserved { record, attempt } => {
                self.run_id.get_or_insert_with(|| record.id.clone());
                if record.status == RunStatus::Running && !self.status.is_terminal() {
                    self.status = DisplayStatus::Running { attempts: *attempt };
                }
            }
            TrackEvent::Finished { outcome } => {
                self.status = match outcome {
                    RunOutcome::Completed => DisplayStatus::Completed,
                    RunOutcome::Errored { message } => DisplayStatus::Errored(message.clone()),
                    RunOutcome::QueryFailed { message } => {
                        DisplayStatus::QueryFailed(message.clone())
                    }
                    RunOutcome::TimedOut { attempts, .. } => {
                        DisplayStatus::TimedOut { attempts: *attempts }
                    }
                    RunOutcome::Cancelled { .. } => DisplayStatus::Cancelled,
                };
            }
            TrackEvent::ArtifactReady { kind, content } => {
                self.failed.remove(kind);
                self.artifacts.insert(*kind, content.clone());
            }
            TrackEvent::ArtifactFailed { kind, .. } => {
                if !self.artifacts.contains_key(kind) {
                    self.failed.insert(*kind);
                }
            }
            TrackEvent::Info(InfoEvent::Cancelling) => {
                if !self.status.is_terminal() {
                    self.status = DisplayStatus::Cancelling;
                }
            }
            TrackEvent::Info(_) => {}
        }
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    /// Show `mode`, or go back to the summary if it is already shown.
    pub fn toggle(&mut self, mode: ViewMode) {
        self.mode = if self.mode == mode {
            ViewMode::Summary
        } else {
            mode
        };
    }

    /// Artifacts shown in the current mode, in display order. Failed or
    /// missing artifacts are left out.
    pub fn visible_panels(&self) -> Vec<(ArtifactKind, &ArtifactContent)> {
        self.mode
            .kinds()
            .iter()
            .filter_map(|k| self.artifacts.get(k).map(|c| (*k, c)))
            .collect()
    }

    pub fn failed_artifacts(&self) -> impl Iterator<Item = ArtifactKind> + '_ {
        self.failed.iter().copied()
    }

    pub fn open_share(&mut self) {
        if self.share == ShareForm::Closed {
            self.share = ShareForm::Editing {
                input: String::new(),
                error: None,
            };
        }
    }

    pub fn close_share(&mut self) {
        if !self.share.is_pending() {
            self.share = ShareForm::Closed;
        }
    }

    pub fn set_share_input(&mut self, value: &str) {
        if let ShareForm::Editing { input, error } = &mut self.share {
            *input = value.to_string();
            *error = None;
        }
    }

    /// Move the form to `Pending` and return the request to send.
    ///
    /// Returns `None` when the form is not being edited or the run id is not
    /// known yet. An input without recipients stays in `Editing` with an error.
    pub fn begin_share(&mut self) -> Option<Result<ShareRequest, ShareError>> {
        let run_id = self.run_id.clone()?;
        let ShareForm::Editing { input, .. } = &self.share else {
            return None;
        };
        let recipients = split_recipients(input);
        if recipients.is_empty() {
            let input = input.clone();
            self.share = ShareForm::Editing {
                input,
                error: Some(ShareError::NoRecipients.to_string()),
            };
            return Some(Err(ShareError::NoRecipients));
        }
        self.share = ShareForm::Pending {
            input: input.clone(),
        };
        Some(Ok(ShareRequest { run_id, recipients }))
    }

    /// Apply the share response to a pending form.
    pub fn resolve_share(&mut self, result: &Result<ShareReceipt, ShareError>) {
        let ShareForm::Pending { input } = &self.share else {
            return;
        };
        self.share = match result {
            Ok(receipt) => {
                self.notice = Some(format!(
                    "Shared with {} recipient(s)",
                    receipt.recipients.len()
                ));
                ShareForm::Closed
            }
            // The backend answered: the input has been consumed.
            Err(
                e @ (ShareError::Unauthorized
                | ShareError::Rejected { .. }
                | ShareError::Unexpected { .. }),
            ) => ShareForm::Editing {
                input: String::new(),
                error: Some(e.to_string()),
            },
            Err(e) => ShareForm::Editing {
                input: input.clone(),
                error: Some(e.to_string()),
            },
        };
    }
}

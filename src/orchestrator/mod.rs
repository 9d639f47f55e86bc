//! Application-level orchestration utilities.
//!
//! This module owns run lifecycle control (submit/poll/fetch/cancel) and post-run processing
//! such as saving artifacts and the run report. UI/CLI layers call into this module to keep
//! responsibilities separated.

mod controller;
mod post_process;

pub use controller::{run_controller, RunStart, TrackedRun, Tracker, UiCommand};
pub use post_process::{default_save_dir, process_run_completion, ProcessedRun, RUN_REPORT_FILE};

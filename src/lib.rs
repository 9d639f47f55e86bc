//! Configure, submit and track evolutionary-computation runs.
//!
//! A [`wizard::Wizard`] builds a [`model::ConfigModel`] step by step; the
//! [`engine`] submits it to the execution backend, polls the run to a
//! terminal state and fetches its artifacts; [`orchestrator`] ties these
//! together for presentation layers such as [`view::RunView`] and the `evoc` CLI.

pub mod config;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod logbook;
pub mod model;
pub mod orchestrator;
pub mod telemetry;
pub mod text_summary;
pub mod view;
pub mod wizard;

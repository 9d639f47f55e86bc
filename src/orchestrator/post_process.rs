//! Post-run processing utilities.
//!
//! Saves fetched artifacts and a run report to disk once tracking has ended.

use super::controller::TrackedRun;
use crate::engine::ArtifactFetcher;
use crate::model::{ArtifactContent, ArtifactKind};
use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

/// Name of the report written next to the artifacts.
pub const RUN_REPORT_FILE: &str = "run.json";

/// Result of post-run processing, ready for presentation layers.
#[derive(Debug, Default)]
pub struct ProcessedRun {
    pub saved_dir: Option<PathBuf>,
    pub saved_files: Vec<PathBuf>,
    pub export_messages: Vec<String>,
}

/// Default location for saved runs, under the user's data directory.
pub fn default_save_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("evoc").join("runs"))
}

/// Save a tracked run under `<save_dir>/<run id>/` when a directory is given.
///
/// Each artifact is written independently; one that cannot be written is
/// reported in `export_messages` and does not stop the others.
pub async fn process_run_completion(
    fetcher: &ArtifactFetcher,
    run: &TrackedRun,
    save_dir: Option<&Path>,
) -> ProcessedRun {
    let mut processed = ProcessedRun::default();
    let (Some(base), Some(run_id)) = (save_dir, run.run_id.as_ref()) else {
        return processed;
    };
    let dir = match run_dir(base, run_id.as_str()) {
        Ok(dir) => dir,
        Err(e) => {
            warn!(%run_id, error = %e, "refusing to save run");
            processed.export_messages.push(format!("Save skipped: {e:#}"));
            return processed;
        }
    };
    if let Err(e) = tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))
    {
        processed.export_messages.push(format!("Save failed: {e:#}"));
        return processed;
    }

    for (kind, content) in &run.artifacts {
        let path = dir.join(kind.file_name());
        match write_artifact(fetcher, run, *kind, content, &path).await {
            Ok(()) => processed.saved_files.push(path),
            Err(e) => {
                warn!(%kind, error = %e, "could not save artifact");
                processed
                    .export_messages
                    .push(format!("Save {} failed: {e:#}", kind.file_name()));
            }
        }
    }

    let report = dir.join(RUN_REPORT_FILE);
    match write_report(run, &report).await {
        Ok(()) => processed.saved_files.push(report),
        Err(e) => processed
            .export_messages
            .push(format!("Save {RUN_REPORT_FILE} failed: {e:#}")),
    }

    info!(dir = %dir.display(), files = processed.saved_files.len(), "run saved");
    processed
        .export_messages
        .push(format!("Saved: {}", dir.display()));
    processed.saved_dir = Some(dir);
    processed
}

/// Directory for one run. The id comes from the backend and must name a single
/// directory directly under `base`.
fn run_dir(base: &Path, run_id: &str) -> Result<PathBuf> {
    let mut components = Path::new(run_id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if !run_id.contains(['/', '\\']) => {
            Ok(base.join(name))
        }
        _ => bail!("run id {run_id:?} is not a plain directory name"),
    }
}

async fn write_artifact(
    fetcher: &ArtifactFetcher,
    run: &TrackedRun,
    kind: ArtifactKind,
    content: &ArtifactContent,
    path: &Path,
) -> Result<()> {
    let bytes: Vec<u8> = match content {
        ArtifactContent::Text(text) => text.clone().into_bytes(),
        ArtifactContent::Structured(value) => serde_json::to_vec_pretty(value)?,
        ArtifactContent::Reference(_) => {
            let record = run
                .last_record
                .as_ref()
                .context("no completed record to download from")?;
            fetcher.download(record, kind).await?.to_vec()
        }
    };
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

async fn write_report(run: &TrackedRun, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(run)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

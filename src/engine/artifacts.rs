use super::ArtifactSource;
use crate::error::ArtifactFetchError;
use crate::model::{ArtifactContent, ArtifactKind, RunId, RunRecord, RunStatus};
use bytes::Bytes;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Result of one fetch pass over a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactReport {
    pub run_id: RunId,
    pub artifacts: BTreeMap<ArtifactKind, ArtifactContent>,
    pub failures: BTreeMap<ArtifactKind, ArtifactFetchError>,
}

impl ArtifactReport {
    pub fn get(&self, kind: ArtifactKind) -> Option<&ArtifactContent> {
        self.artifacts.get(&kind)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Retrieves the artifacts of completed runs and caches what it got.
///
/// Successful content is never requested again for the same run. Failed
/// artifacts are left out of the cache and retried on the next call.
#[derive(Clone)]
pub struct ArtifactFetcher {
    source: Arc<dyn ArtifactSource>,
    runs: Arc<Mutex<HashMap<RunId, RunCache>>>,
}

/// Cached artifacts of one run; its lock is held while that run is fetched.
type RunCache = Arc<Mutex<BTreeMap<ArtifactKind, ArtifactContent>>>;

impl ArtifactFetcher {
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            source,
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn run_cache(&self, run_id: &RunId) -> RunCache {
        self.runs
            .lock()
            .await
            .entry(run_id.clone())
            .or_default()
            .clone()
    }

    fn ensure_completed(record: &RunRecord) -> Result<(), ArtifactFetchError> {
        if record.status == RunStatus::Completed {
            Ok(())
        } else {
            Err(ArtifactFetchError::RunNotCompleted {
                run_id: record.id.to_string(),
            })
        }
    }

    /// Fetch every artifact of `record` that is not cached yet, concurrently.
    ///
    /// The run's cache lock is held for the whole pass, so two passes over the
    /// same run never request the same artifact twice. Other runs are not blocked.
    #[instrument(skip(self, record), fields(run_id = %record.id))]
    pub async fn fetch_all(&self, record: &RunRecord) -> Result<ArtifactReport, ArtifactFetchError> {
        Self::ensure_completed(record)?;

        let run_cache = self.run_cache(&record.id).await;
        let mut entry = run_cache.lock().await;
        let missing: Vec<ArtifactKind> = ArtifactKind::ALL
            .into_iter()
            .filter(|k| !entry.contains_key(k))
            .collect();
        debug!(missing = missing.len(), cached = entry.len(), "fetching artifacts");

        let source = &self.source;
        let run_id = &record.id;
        let results = join_all(
            missing
                .into_iter()
                .map(|kind| async move { (kind, source.fetch(run_id, kind).await) }),
        )
        .await;

        let mut failures = BTreeMap::new();
        for (kind, res) in results {
            match res {
                Ok(content) => {
                    entry.insert(kind, content);
                }
                Err(e) => {
                    warn!(%kind, error = %e, "artifact fetch failed");
                    failures.insert(kind, e);
                }
            }
        }

        Ok(ArtifactReport {
            run_id: record.id.clone(),
            artifacts: (*entry).clone(),
            failures,
        })
    }

    /// Fetch a single artifact, going through the same cache.
    pub async fn fetch(
        &self,
        record: &RunRecord,
        kind: ArtifactKind,
    ) -> Result<ArtifactContent, ArtifactFetchError> {
        Self::ensure_completed(record)?;

        let run_cache = self.run_cache(&record.id).await;
        let mut entry = run_cache.lock().await;
        if let Some(content) = entry.get(&kind) {
            return Ok(content.clone());
        }
        let content = self.source.fetch(&record.id, kind).await?;
        entry.insert(kind, content.clone());
        Ok(content)
    }

    /// Raw bytes of one artifact. Not cached.
    pub async fn download(
        &self,
        record: &RunRecord,
        kind: ArtifactKind,
    ) -> Result<Bytes, ArtifactFetchError> {
        Self::ensure_completed(record)?;
        self.source.download(&record.id, kind).await
    }

    pub async fn cached(&self, run_id: &RunId) -> BTreeMap<ArtifactKind, ArtifactContent> {
        let run_cache = self.runs.lock().await.get(run_id).cloned();
        match run_cache {
            Some(run_cache) => run_cache.lock().await.clone(),
            None => BTreeMap::new(),
        }
    }
}

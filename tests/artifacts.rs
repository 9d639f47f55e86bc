use evoc::engine::ArtifactFetcher;
use evoc::error::ArtifactFetchError;
use evoc::fakes::MemoryArtifactStore;
use evoc::model::{ArtifactKind, RunId, RunRecord, RunStatus, TrackEvent};
use evoc::view::{RunView, ViewMode};
use std::sync::Arc;
use std::time::Duration;

fn completed(id: &str) -> RunRecord {
    RunRecord::new(RunId::new(id), RunStatus::Completed)
}

#[tokio::test]
async fn second_fetch_is_served_from_cache() {
    let store = Arc::new(MemoryArtifactStore::new().with_completed_run("r1"));
    let fetcher = ArtifactFetcher::new(store.clone());
    let record = completed("r1");

    let first = fetcher.fetch_all(&record).await.unwrap();
    let second = fetcher.fetch_all(&record).await.unwrap();

    assert!(first.is_complete());
    assert_eq!(first, second);
    assert_eq!(store.total_calls(), ArtifactKind::ALL.len());
    for kind in ArtifactKind::ALL {
        assert_eq!(store.call_count(kind), 1, "{kind}");
    }
}

#[tokio::test]
async fn concurrent_passes_do_not_duplicate_requests() {
    let store = Arc::new(MemoryArtifactStore::new().with_completed_run("r1"));
    let fetcher = ArtifactFetcher::new(store.clone());
    let record = completed("r1");

    let (a, b) = tokio::join!(fetcher.fetch_all(&record), fetcher.fetch_all(&record));

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(store.total_calls(), ArtifactKind::ALL.len());
}

#[tokio::test]
async fn missing_plot_does_not_hide_the_other_panels() {
    let store = Arc::new(MemoryArtifactStore::new().with_completed_run("r1"));
    store.remove(&RunId::new("r1"), ArtifactKind::FitnessPlot);
    let fetcher = ArtifactFetcher::new(store.clone());

    let report = fetcher.fetch_all(&completed("r1")).await.unwrap();

    assert_eq!(
        report.failures.get(&ArtifactKind::FitnessPlot),
        Some(&ArtifactFetchError::Status {
            kind: ArtifactKind::FitnessPlot,
            status: 404
        })
    );
    assert!(report.get(ArtifactKind::Logbook).is_some());
    assert!(report.get(ArtifactKind::Best).is_some());

    let mut view = RunView::attached(RunId::new("r1"));
    for (kind, content) in &report.artifacts {
        view.apply(&TrackEvent::ArtifactReady {
            kind: *kind,
            content: content.clone(),
        });
    }
    for (kind, err) in &report.failures {
        view.apply(&TrackEvent::ArtifactFailed {
            kind: *kind,
            message: err.to_string(),
        });
    }

    let summary: Vec<_> = view.visible_panels().into_iter().map(|(k, _)| k).collect();
    assert_eq!(summary, vec![ArtifactKind::InputConfig, ArtifactKind::Best]);
    view.set_mode(ViewMode::Logs);
    assert_eq!(view.visible_panels().len(), 1);
}

#[tokio::test]
async fn failed_artifacts_are_retried_on_the_next_pass() {
    let store = Arc::new(MemoryArtifactStore::new().with_completed_run("r1"));
    store.fail_times(&RunId::new("r1"), ArtifactKind::Logbook, 503, 1);
    let fetcher = ArtifactFetcher::new(store.clone());
    let record = completed("r1");

    let first = fetcher.fetch_all(&record).await.unwrap();
    assert!(first.failures.contains_key(&ArtifactKind::Logbook));

    let second = fetcher.fetch_all(&record).await.unwrap();
    assert!(second.is_complete());
    assert_eq!(store.call_count(ArtifactKind::Logbook), 2);
    assert_eq!(store.total_calls(), ArtifactKind::ALL.len() + 1);
}

#[tokio::test]
async fn running_record_is_rejected_without_network_calls() {
    let store = Arc::new(MemoryArtifactStore::new().with_completed_run("r1"));
    let fetcher = ArtifactFetcher::new(store.clone());
    let running = RunRecord::new(RunId::new("r1"), RunStatus::Running);

    let err = fetcher.fetch_all(&running).await.unwrap_err();

    assert_eq!(
        err,
        ArtifactFetchError::RunNotCompleted {
            run_id: "r1".into()
        }
    );
    assert!(fetcher
        .fetch(&running, ArtifactKind::Best)
        .await
        .is_err());
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn single_fetch_shares_the_cache() {
    let store = Arc::new(MemoryArtifactStore::new().with_completed_run("r1"));
    let fetcher = ArtifactFetcher::new(store.clone());
    let record = completed("r1");

    let best = fetcher.fetch(&record, ArtifactKind::Best).await.unwrap();
    assert_eq!(best.as_text(), Some("[0.12, 0.98, 0.33]\n"));
    fetcher.fetch_all(&record).await.unwrap();

    assert_eq!(store.call_count(ArtifactKind::Best), 1);
    assert_eq!(fetcher.cached(&record.id).await.len(), ArtifactKind::ALL.len());
}

#[tokio::test(start_paused = true)]
async fn unrelated_runs_are_fetched_side_by_side() {
    let store = Arc::new(
        MemoryArtifactStore::new()
            .with_completed_run("r1")
            .with_completed_run("r2")
            .with_latency(Duration::from_secs(1)),
    );
    let fetcher = ArtifactFetcher::new(store.clone());
    let (first, second) = (completed("r1"), completed("r2"));

    let started = tokio::time::Instant::now();
    let (a, b, best) = tokio::join!(
        fetcher.fetch_all(&first),
        fetcher.fetch_all(&second),
        fetcher.fetch(&second, ArtifactKind::Best),
    );

    assert!(a.unwrap().is_complete());
    assert!(b.unwrap().is_complete());
    assert!(best.is_ok());
    // One round of requests, not one per run.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(store.total_calls(), 2 * ArtifactKind::ALL.len());
}

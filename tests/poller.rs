use evoc::config::PollPolicy;
use evoc::engine::{CancelSource, PollOutcome, RunPoller, TaskHandle};
use evoc::error::QueryError;
use evoc::fakes::{ScriptedBackend, StatusStep};
use evoc::model::{InfoEvent, RunId, RunOutcome, TrackEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_secs(4),
        max_attempts: None,
        timeout: None,
    }
}

#[tokio::test(start_paused = true)]
async fn reaches_completed_after_n_plus_one_queries() {
    let backend = Arc::new(
        ScriptedBackend::completing_after("run-1", 3).with_latency(Duration::from_millis(250)),
    );
    let poller = RunPoller::new(backend.clone(), policy());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let source = CancelSource::new();

    let started = tokio::time::Instant::now();
    let outcome = poller
        .poll_with_events(&RunId::new("run-1"), source.signal(), Some(&tx))
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.attempts(), 4);
    assert_eq!(backend.query_count(), 4);
    assert_eq!(backend.max_in_flight(), 1);
    assert!(started.elapsed() >= Duration::from_secs(12));

    drop(tx);
    let mut observed = 0;
    let mut waits = 0;
    while let Some(ev) = rx.recv().await {
        match ev {
            TrackEvent::StatusObserved { record, .. } => {
                assert_eq!(record.id.as_str(), "run-1");
                observed += 1;
            }
            TrackEvent::Info(InfoEvent::NextPoll { delay_ms, .. }) => {
                assert_eq!(delay_ms, 4000);
                waits += 1;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!((observed, waits), (4, 3));
}

#[tokio::test(start_paused = true)]
async fn errored_on_first_query_stops_immediately() {
    let backend = Arc::new(ScriptedBackend::new(
        "run-2",
        [StatusStep::Errored(Some("evaluation raised ZeroDivisionError".into()))],
    ));
    let poller = RunPoller::new(backend.clone(), policy());
    let source = CancelSource::new();

    let outcome = poller.poll(&RunId::new("run-2"), source.signal()).await;

    assert!(matches!(outcome, PollOutcome::Errored { attempts: 1, .. }));
    assert_eq!(backend.query_count(), 1);
    assert_eq!(
        outcome.summary(),
        RunOutcome::Errored {
            message: Some("evaluation raised ZeroDivisionError".into())
        }
    );
}

#[tokio::test(start_paused = true)]
async fn failed_query_is_terminal_and_not_retried() {
    let backend = Arc::new(ScriptedBackend::new(
        "run-3",
        [
            StatusStep::Running,
            StatusStep::Unreachable("connection refused".into()),
            StatusStep::Completed,
        ],
    ));
    let poller = RunPoller::new(backend.clone(), policy());
    let source = CancelSource::new();

    let outcome = poller.poll(&RunId::new("run-3"), source.signal()).await;

    match outcome {
        PollOutcome::QueryFailed { attempts, error } => {
            assert_eq!(attempts, 2);
            assert!(matches!(error, QueryError::Transport(_)));
        }
        other => panic!("expected QueryFailed, got {other:?}"),
    }
    assert_eq!(backend.query_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn http_error_on_status_is_a_failed_query_not_an_errored_run() {
    let backend = Arc::new(ScriptedBackend::new("run-4", [StatusStep::HttpStatus(502)]));
    let poller = RunPoller::new(backend, policy());
    let source = CancelSource::new();

    let outcome = poller.poll(&RunId::new("run-4"), source.signal()).await;

    assert!(matches!(
        outcome.summary(),
        RunOutcome::QueryFailed { .. }
    ));
    assert!(outcome.record().is_none());
}

#[tokio::test(start_paused = true)]
async fn attempt_limit_yields_timed_out() {
    let backend = Arc::new(ScriptedBackend::new("run-5", [StatusStep::Running]));
    let poller = RunPoller::new(
        backend.clone(),
        PollPolicy {
            max_attempts: Some(3),
            ..policy()
        },
    );
    let source = CancelSource::new();

    let outcome = poller.poll(&RunId::new("run-5"), source.signal()).await;

    assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 3, .. }));
    assert_eq!(backend.query_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn wall_clock_limit_yields_timed_out() {
    let backend = Arc::new(ScriptedBackend::new("run-6", [StatusStep::Running]));
    let poller = RunPoller::new(
        backend.clone(),
        PollPolicy {
            timeout: Some(Duration::from_secs(10)),
            ..policy()
        },
    );
    let source = CancelSource::new();

    let outcome = poller.poll(&RunId::new("run-6"), source.signal()).await;

    // Queries at 0s, 4s and 8s; the last wait is cut to the remaining 2s.
    match outcome {
        PollOutcome::TimedOut { attempts, elapsed } => {
            assert_eq!(attempts, 3);
            assert!(elapsed >= Duration::from_secs(10));
        }
        other => panic!("expected TimedOut, got {other:?}"),
    }
    assert_eq!(backend.query_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn cancelling_stops_pending_polls() {
    let backend = Arc::new(ScriptedBackend::new("run-7", [StatusStep::Running]));
    let poller = RunPoller::new(backend.clone(), policy());

    let mut task = TaskHandle::spawn(move |cancel| async move {
        poller.poll(&RunId::new("run-7"), cancel).await
    });
    tokio::time::sleep(Duration::from_secs(6)).await;
    task.cancel();
    let outcome = task.join().await.unwrap();

    match outcome {
        PollOutcome::Cancelled { attempts } => assert_eq!(attempts, backend.query_count()),
        other => panic!("expected Cancelled, got {other:?}"),
    }
    let seen = backend.query_count();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.query_count(), seen);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_polling() {
    let backend = Arc::new(ScriptedBackend::new("run-8", [StatusStep::Running]));
    let poller = RunPoller::new(backend.clone(), policy());

    let task = TaskHandle::spawn(move |cancel| async move {
        poller.poll(&RunId::new("run-8"), cancel).await
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    drop(task);

    let seen = backend.query_count();
    assert!(seen >= 1);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.query_count(), seen);
}

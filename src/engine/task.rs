//! Cancellable scheduled work.
//!
//! Every continuation the tracker schedules (the next status query, an
//! artifact fetch) runs inside a [`TaskHandle`]. Dropping the handle cancels
//! the work, which ties pending continuations to the lifetime of whoever
//! started them.

use std::future::Future;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

/// Owning side of a cancellation flag.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Drop for CancelSource {
    fn drop(&mut self) {
        self.tx.send_replace(true);
    }
}

/// Receiving side of a cancellation flag. A dropped source counts as cancelled.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once cancellation is requested or the source is gone.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// A spawned task plus the flag that cancels it.
#[derive(Debug)]
pub struct TaskHandle<T> {
    source: CancelSource,
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Spawn `f` with a signal it is expected to observe at its suspension points.
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancelSignal) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let source = CancelSource::new();
        let handle = tokio::spawn(f(source.signal()));
        Self {
            source,
            handle: Some(handle),
        }
    }

    /// Ask the task to stop at its next suspension point.
    pub fn cancel(&self) {
        self.source.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the task's result. The handle is left finished.
    pub async fn join(&mut self) -> Result<T, JoinError> {
        match self.handle.as_mut() {
            Some(h) => {
                let res = h.await;
                self.handle = None;
                res
            }
            None => futures::future::pending().await,
        }
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        self.source.cancel();
        // A JoinHandle that is merely dropped keeps the task running.
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_the_task() {
        let mut task = TaskHandle::spawn(|mut cancel| async move {
            tokio::select! {
                _ = cancel.cancelled() => "cancelled",
                _ = tokio::time::sleep(Duration::from_secs(3600)) => "slept",
            }
        });
        task.cancel();
        assert_eq!(task.join().await.unwrap(), "cancelled");
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_pending_work() {
        let reached = Arc::new(AtomicBool::new(false));
        let reached2 = reached.clone();
        let task = TaskHandle::spawn(|_cancel| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            reached2.store(true, Ordering::SeqCst);
        });
        drop(task);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[test]
    fn dropped_source_reads_as_cancelled() {
        let source = CancelSource::new();
        let signal = source.signal();
        assert!(!signal.is_cancelled());
        drop(source);
        assert!(signal.is_cancelled());
    }
}

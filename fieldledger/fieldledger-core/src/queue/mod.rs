//! Single-flight mutation queue.
//!
//! Every read-modify-write cycle against the backing file runs as one task on
//! a [`MutationQueue`]. A dedicated worker drains submitted tasks strictly one
//! at a time, in the order `run_exclusive` was called.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::QueueError;

type Job = BoxFuture<'static, ()>;

/// Owned serializer for store access. Cloning yields another handle to the
/// same worker; the worker exits once every handle is dropped and the
/// remaining tasks have run.
#[derive(Clone)]
pub struct MutationQueue {
    jobs: mpsc::UnboundedSender<Job>,
    stats: Arc<QueueStats>,
}

#[derive(Default)]
struct QueueStats {
    submitted: AtomicU64,
    pending: AtomicUsize,
}

impl MutationQueue {
    /// Spawns the worker onto the current Tokio runtime.
    pub fn new() -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
            tracing::debug!("mutation queue drained, worker exiting");
        });
        Self {
            jobs,
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Queue `task` behind everything submitted so far and resolve with its
    /// outcome.
    ///
    /// The task is enqueued before this function returns, so submission order
    /// is fixed at call time rather than at first poll. Dropping the returned
    /// future does not withdraw the task. A panic inside the task is reported
    /// to this caller as [`QueueError::Panicked`] and later tasks still run.
    pub fn run_exclusive<F, Fut, T>(
        &self,
        task: F,
    ) -> impl Future<Output = Result<T, QueueError>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let stats = Arc::clone(&self.stats);
        let seq = stats.submitted.fetch_add(1, Ordering::SeqCst);
        stats.pending.fetch_add(1, Ordering::SeqCst);

        let job: Job = async move {
            let outcome = AssertUnwindSafe(async move { task().await })
                .catch_unwind()
                .await
                .map_err(|_| QueueError::Panicked);
            if outcome.is_err() {
                tracing::warn!(seq, "queued task panicked");
            }
            stats.pending.fetch_sub(1, Ordering::SeqCst);
            // receiver may be gone if the caller stopped waiting
            let _ = done_tx.send(outcome);
        }
        .boxed();

        let submitted = match self.jobs.send(job) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.stats.pending.fetch_sub(1, Ordering::SeqCst);
                Err(QueueError::Closed)
            }
        };

        async move {
            submitted?;
            done_rx.await.map_err(|_| QueueError::Closed)?
        }
    }

    /// Tasks submitted but not yet finished.
    pub fn pending(&self) -> usize {
        self.stats.pending.load(Ordering::SeqCst)
    }

    /// Total tasks ever submitted through this queue.
    pub fn submitted(&self) -> u64 {
        self.stats.submitted.load(Ordering::SeqCst)
    }
}

impl Default for MutationQueue {
    fn default() -> Self {
        Self::new()
    }
}

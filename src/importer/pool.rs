//! Bounded worker pool executing fire-and-forget reconciliation jobs.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{Error, Result};

struct Job {
    label: String,
    fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
}

/// A fixed number of worker tasks draining one unbounded job queue.
///
/// Submission never blocks; jobs queue until a worker frees up. A panicking
/// job is caught and logged without taking its worker down. Must be created
/// inside a tokio runtime.
pub(crate) struct WorkerPool {
    tx: mpsc::UnboundedSender<Job>,
    shutdown_tx: broadcast::Sender<()>,
    closed: AtomicBool,
    workers: Mutex<JoinSet<()>>,
}

impl WorkerPool {
    pub(crate) fn new(workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let (shutdown_tx, _) = broadcast::channel(1);

        let mut set = JoinSet::new();
        for _ in 0..workers {
            set.spawn(worker_loop(Arc::clone(&rx), shutdown_tx.subscribe()));
        }

        Self {
            tx,
            shutdown_tx,
            closed: AtomicBool::new(false),
            workers: Mutex::new(set),
        }
    }

    /// Queue a job. Returns `false` when the pool is shut down, in which
    /// case the job is dropped.
    pub(crate) fn submit<F>(&self, label: impl Into<String>, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        if self.closed.load(Ordering::SeqCst) {
            debug!(job = %label, "pool shut down, dropping job");
            return false;
        }
        let job = Job {
            label,
            fut: Box::pin(task),
        };
        if let Err(err) = self.tx.send(job) {
            debug!(job = %err.0.label, "pool queue closed, dropping job");
            return false;
        }
        true
    }

    /// Stop accepting jobs, wait up to `grace` for running jobs to finish,
    /// then abort the rest. Queued-but-unstarted jobs are abandoned.
    /// Idempotent; only the first call does the work.
    pub(crate) async fn shutdown(&self, grace: Duration) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.shutdown_tx.send(());

        let mut workers = {
            let mut guard = self.workers.lock().expect("pool lock poisoned");
            std::mem::take(&mut *guard)
        };
        let drain = async {
            while workers.join_next().await.is_some() {}
        };
        let drained = tokio::time::timeout(grace, drain).await;
        match drained {
            Ok(()) => Ok(()),
            Err(_) => {
                let aborted = workers.len();
                workers.shutdown().await;
                Err(Error::ShutdownForced { aborted })
            }
        }
    }
}

// Dropping the pool drops the JoinSet, which aborts any remaining workers.

async fn worker_loop(
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => None,
                job = rx.recv() => job,
            }
        };
        let Some(Job { label, fut }) = job else {
            break;
        };
        // A panic ends the job, not the worker.
        if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
            error!(job = %label, "job panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    #[tokio::test]
    async fn executes_submitted_jobs() {
        let pool = WorkerPool::new(2);
        let (tx, rx) = oneshot::channel();

        assert!(pool.submit("job", async move {
            let _ = tx.send(42u32);
        }));

        let got = timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
        assert_eq!(got, 42);
    }

    #[tokio::test]
    async fn a_panicking_job_does_not_kill_the_worker() {
        let pool = WorkerPool::new(1);
        let (tx, rx) = oneshot::channel();

        pool.submit("boom", async {
            panic!("backend went sideways");
        });
        pool.submit("after", async move {
            let _ = tx.send(());
        });

        timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(1);
        pool.shutdown(Duration::from_millis(100)).await.unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        assert!(!pool.submit("late", async move {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shutdown_waits_for_running_jobs() {
        let pool = WorkerPool::new(1);
        let done = Arc::new(AtomicUsize::new(0));
        let done2 = Arc::clone(&done);

        pool.submit("slow", async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            done2.fetch_add(1, Ordering::SeqCst);
        });
        // Give the worker a chance to pick the job up.
        tokio::time::sleep(Duration::from_millis(10)).await;

        pool.shutdown(Duration::from_secs(2)).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_aborts_jobs_that_outlive_the_grace_period() {
        let pool = WorkerPool::new(1);
        pool.submit("hang", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = pool.shutdown(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, Error::ShutdownForced { aborted: 1 }));

        // A second shutdown is a quiet no-op.
        pool.shutdown(Duration::from_millis(50)).await.unwrap();
    }
}

//! Bounded worker pool with per-job deadlines.
//!
//! Request handlers never run remote calls or PDF work inline. They submit
//! the job here and wait on it with a deadline:
//!
//! ```text
//! handler ──submit──▶ tokio::spawn ──permit──▶ job (async, or spawn_blocking)
//!    │                                           │
//!    └──── timeout(deadline, JoinHandle) ◀───────┘
//! ```
//!
//! On expiry the handler stops waiting and answers 504. The job is *not*
//! cancelled: its `JoinHandle` is dropped, which detaches the task. It keeps
//! its pool permit (and anything else it owns) until it finishes on its own;
//! its result is discarded. Binaries shut the runtime down in the background
//! so an orphaned blocking job never holds up process exit.

use crate::error::ServiceError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A bounded pool of job slots shared by all requests of one service.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool allowing at most `max_jobs` jobs in flight.
    pub fn new(max_jobs: usize) -> Self {
        let capacity = max_jobs.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Number of jobs currently holding a slot, orphans included.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Run an async job on the pool and wait at most `deadline` for it.
    ///
    /// Time spent waiting for a free slot counts against the deadline.
    pub async fn run<F, T>(
        &self,
        operation: &'static str,
        deadline: Duration,
        job: F,
    ) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| ServiceError::Internal("worker pool closed".into()))?;
            job.await
        });
        join_with_deadline(operation, deadline, handle).await
    }

    /// Run a blocking job on tokio's blocking threads and wait at most
    /// `deadline` for it.
    pub async fn run_blocking<F, T>(
        &self,
        operation: &'static str,
        deadline: Duration,
        job: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| ServiceError::Internal("worker pool closed".into()))?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            })
            .await
            .map_err(|e| ServiceError::Internal(format!("{operation} worker panicked: {e}")))?
        });
        join_with_deadline(operation, deadline, handle).await
    }
}

async fn join_with_deadline<T>(
    operation: &'static str,
    deadline: Duration,
    handle: JoinHandle<Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(result)) => {
            debug!(operation, "worker finished");
            result
        }
        Ok(Err(join_err)) => Err(ServiceError::Internal(format!(
            "{operation} worker failed: {join_err}"
        ))),
        Err(_) => {
            // Dropping the handle detaches the task; it runs to completion
            // and its result is discarded.
            warn!(
                operation,
                deadline_secs = deadline.as_secs(),
                "deadline elapsed, abandoning worker"
            );
            Err(ServiceError::Timeout {
                operation,
                secs: deadline.as_secs(),
            })
        }
    }
}

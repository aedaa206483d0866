//! Background Rebuild Pool
//!
//! A fixed set of workers draining a bounded queue of rebuild jobs. The
//! logical-expiration strategy hands expired keys to this pool so that the
//! caller that noticed the expiry can return the stale value immediately.
//!
//! # Guarantees
//!
//! - `submit` never blocks. A full queue or a shut-down pool rejects the job
//!   and hands it back, so the caller can release whatever the job owns.
//! - Each job runs in its own task. A panicking job is counted and logged;
//!   the worker that ran it keeps serving the queue.
//! - `shutdown` stops accepting jobs, lets the workers drain what was already
//!   queued, and waits for them to exit.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use guardcache_core::{CacheResult, SchedulerError};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

// ============================================================================
// JOBS
// ============================================================================

/// A unit of background work.
pub trait RebuildJob: Send + 'static {
    /// Short label used in logs, usually the cache key.
    fn describe(&self) -> String;

    /// Perform the rebuild.
    fn run(self: Box<Self>) -> BoxFuture<'static, CacheResult<()>>;

    /// Called instead of `run` when the pool refuses the job.
    fn abandon(self: Box<Self>) -> BoxFuture<'static, ()>;
}

type BoxedJob = Box<dyn RebuildJob>;

/// A job the pool refused, returned to the submitter.
pub struct Rejected {
    pub error: SchedulerError,
    pub job: BoxedJob,
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .field("job", &self.job.describe())
            .finish()
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for rebuild pool activity.
#[derive(Debug, Default)]
pub struct RebuildMetrics {
    /// Jobs accepted onto the queue
    pub submitted: AtomicU64,
    /// Jobs refused because the queue was full or the pool was shut down
    pub rejected: AtomicU64,
    /// Jobs that ran to completion
    pub completed: AtomicU64,
    /// Jobs that returned an error
    pub failed: AtomicU64,
    /// Jobs that panicked
    pub panicked: AtomicU64,
}

impl RebuildMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> RebuildMetricsSnapshot {
        RebuildMetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of rebuild metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildMetricsSnapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
}

// ============================================================================
// POOL
// ============================================================================

#[derive(Default)]
struct PoolState {
    metrics: RebuildMetrics,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl PoolState {
    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Bounded pool of rebuild workers.
pub struct RebuildPool {
    sender: Mutex<Option<mpsc::Sender<BoxedJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
    state: Arc<PoolState>,
}

impl fmt::Debug for RebuildPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebuildPool")
            .field("capacity", &self.capacity)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl RebuildPool {
    /// Spawn `workers` workers sharing a queue of `capacity` pending jobs.
    ///
    /// Must be called from within a tokio runtime. Zero values are raised
    /// to one.
    pub fn start(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel::<BoxedJob>(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let state = Arc::new(PoolState::default());

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let state = Arc::clone(&state);
                tokio::spawn(worker_loop(worker_id, receiver, state))
            })
            .collect();

        tracing::info!(workers, capacity, "Rebuild pool started");

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            capacity,
            state,
        }
    }

    /// Queue a job without waiting.
    pub fn submit(&self, job: BoxedJob) -> Result<(), Rejected> {
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(_) => {
                return Err(self.reject(SchedulerError::ShutDown, job));
            }
        };
        let Some(sender) = guard.as_ref() else {
            return Err(self.reject(SchedulerError::ShutDown, job));
        };

        // Count before sending so a fast worker cannot finish the job first.
        self.state.in_flight.fetch_add(1, Ordering::AcqRel);
        match sender.try_send(job) {
            Ok(()) => {
                self.state.metrics.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.state.finish_one();
                Err(self.reject(
                    SchedulerError::QueueFull {
                        capacity: self.capacity,
                    },
                    job,
                ))
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                self.state.finish_one();
                Err(self.reject(SchedulerError::ShutDown, job))
            }
        }
    }

    fn reject(&self, error: SchedulerError, job: BoxedJob) -> Rejected {
        self.state.metrics.rejected.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(job = %job.describe(), error = %error, "Rebuild job rejected");
        Rejected { error, job }
    }

    /// Jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }

    pub fn metrics(&self) -> RebuildMetricsSnapshot {
        self.state.metrics.snapshot()
    }

    /// Wait until no job is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting jobs, drain the queue and wait for every worker.
    pub async fn shutdown(&self) -> RebuildMetricsSnapshot {
        let sender = self.sender.lock().ok().and_then(|mut guard| guard.take());
        if sender.is_none() {
            return self.metrics();
        }
        drop(sender);

        let handles: Vec<_> = self
            .workers
            .lock()
            .map(|mut guard| guard.drain(..).collect())
            .unwrap_or_default();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Rebuild worker exited abnormally");
            }
        }

        let snapshot = self.metrics();
        tracing::info!(
            submitted = snapshot.submitted,
            completed = snapshot.completed,
            failed = snapshot.failed,
            panicked = snapshot.panicked,
            rejected = snapshot.rejected,
            "Rebuild pool shut down"
        );
        snapshot
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<BoxedJob>>>,
    state: Arc<PoolState>,
) {
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else {
            tracing::debug!(worker_id, "Rebuild worker exiting");
            break;
        };

        let label = job.describe();
        match tokio::spawn(job.run()).await {
            Ok(Ok(())) => {
                state.metrics.completed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(worker_id, job = %label, "Rebuild completed");
            }
            Ok(Err(e)) => {
                state.metrics.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(worker_id, job = %label, error = %e, "Rebuild failed");
            }
            Err(e) if e.is_panic() => {
                state.metrics.panicked.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker_id, job = %label, "Rebuild panicked");
            }
            Err(e) => {
                state.metrics.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker_id, job = %label, error = %e, "Rebuild task cancelled");
            }
        }
        state.finish_one();
    }
}

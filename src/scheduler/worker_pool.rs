//! Worker pool that drains the task queue.
//!
//! The pool owns a fixed number of long-lived workers. Each worker loops:
//! take one task from the [`TaskQueue`], run it to completion through the
//! [`TaskProcessor`], repeat. With `N` workers at most `N` tasks are in the
//! `Processing` state at any moment.
//!
//! # Features
//!
//! - Graceful shutdown with broadcast channel
//! - Panic isolation: a panicking task ends in `Error`, its worker keeps going
//! - Pool statistics tracking

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::task::{Task, TaskState};

use super::queue::TaskQueue;

/// Runs one task to a terminal state.
///
/// Implementations move the task from `Processing` to `Success` or `Error`
/// and must not return earlier. The pool does not care what kind of task it
/// is handing over.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, task: Arc<Task>);
}

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The configuration cannot start a pool.
    #[error("Invalid worker pool configuration: {0}")]
    InvalidConfig(String),

    /// Pool is already running.
    #[error("Pool is already running")]
    AlreadyRunning,

    /// Pool is not running.
    #[error("Pool is not running")]
    NotRunning,

    /// Shutdown timed out.
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Number of workers currently processing tasks.
    pub active_workers: usize,
    /// Tasks taken from the queue.
    pub served: u64,
    /// Tasks that ended in `Success`.
    pub succeeded: u64,
    /// Tasks that ended in `Error`.
    pub failed: u64,
    /// Average task processing duration.
    pub average_job_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of finished tasks (succeeded + failed).
    pub fn total_processed(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.succeeded as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    served: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            served: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
        }
    }

    fn record_served(&self) -> u64 {
        self.served.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record_completion(&self, duration: Duration) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let succeeded = self.succeeded.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);

        let finished = succeeded + failed;
        let average_duration = if finished > 0 {
            Duration::from_millis(total_duration_ms / finished)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            active_workers: self.active_workers.load(Ordering::SeqCst) as usize,
            served: self.served.load(Ordering::SeqCst),
            succeeded,
            failed,
            average_job_duration: average_duration,
        }
    }
}

/// Worker pool that manages the workers draining a [`TaskQueue`].
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<TaskQueue>,
    processor: Arc<dyn TaskProcessor>,
    shutdown_tx: broadcast::Sender<()>,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
    is_running: AtomicBool,
}

impl WorkerPool {
    /// Creates a new, stopped worker pool.
    ///
    /// # Arguments
    ///
    /// * `config` - Pool configuration
    /// * `queue` - Queue the workers take tasks from
    /// * `processor` - Runs each task to a terminal state
    pub fn new(
        config: WorkerPoolConfig,
        queue: Arc<TaskQueue>,
        processor: Arc<dyn TaskProcessor>,
    ) -> Self {
        // only one shutdown signal is ever sent
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            queue,
            processor,
            shutdown_tx,
            worker_handles: Vec::new(),
            stats: Arc::new(SharedPoolStats::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Starts all workers in the pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyRunning` if the pool is already running,
    /// or `PoolError::InvalidConfig` for a pool of zero workers.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::AlreadyRunning);
        }
        if self.config.num_workers == 0 {
            return Err(PoolError::InvalidConfig(
                "num_workers must be at least 1".to_string(),
            ));
        }

        for i in 0..self.config.num_workers {
            let worker = Worker::new(
                format!("worker-{}", i),
                Arc::clone(&self.queue),
                Arc::clone(&self.processor),
                self.shutdown_tx.subscribe(),
                Arc::clone(&self.stats),
            );

            self.worker_handles.push(tokio::spawn(worker.run()));
        }

        self.is_running.store(true, Ordering::SeqCst);
        info!(num_workers = self.config.num_workers, "Worker pool started");

        Ok(())
    }

    /// Gracefully shuts down all workers.
    ///
    /// Workers finish the task they are serving, then stop. Tasks still
    /// waiting in the queue stay there.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ShutdownTimeout` if workers don't stop within
    /// the configured timeout.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }

        info!("Initiating worker pool shutdown");

        // workers may already be gone
        let _ = self.shutdown_tx.send(());

        let shutdown_future = async {
            for handle in self.worker_handles.drain(..) {
                if let Err(e) = handle.await {
                    error!(error = %e, "Worker task panicked during shutdown");
                }
            }
        };

        let result = tokio::time::timeout(self.config.shutdown_timeout, shutdown_future).await;
        self.is_running.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                info!("Worker pool shutdown complete");
                Ok(())
            }
            Err(_) => Err(PoolError::ShutdownTimeout(self.config.shutdown_timeout)),
        }
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.num_workers)
    }

    /// Returns whether the pool is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Returns the number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Returns a reference to the task queue.
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }
}

/// A single worker that processes tasks from the queue.
struct Worker {
    id: String,
    queue: Arc<TaskQueue>,
    processor: Arc<dyn TaskProcessor>,
    shutdown_rx: broadcast::Receiver<()>,
    stats: Arc<SharedPoolStats>,
}

impl Worker {
    fn new(
        id: String,
        queue: Arc<TaskQueue>,
        processor: Arc<dyn TaskProcessor>,
        shutdown_rx: broadcast::Receiver<()>,
        stats: Arc<SharedPoolStats>,
    ) -> Self {
        Self {
            id,
            queue,
            processor,
            shutdown_rx,
            stats,
        }
    }

    /// Main worker loop.
    ///
    /// Waits for the next task or the shutdown signal, whichever comes
    /// first. A task in progress is always finished before the signal is
    /// looked at again.
    async fn run(mut self) {
        info!(worker_id = %self.id, "Worker started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
                next = self.queue.pop() => match next {
                    Some(task) => self.serve(task).await,
                    None => {
                        info!(worker_id = %self.id, "Task queue closed");
                        break;
                    }
                },
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Runs one task to a terminal state and records the outcome.
    async fn serve(&self, task: Arc<Task>) {
        let task_id = task.unique_id();
        let start_time = Instant::now();
        let served = self.stats.record_served();

        info!(
            worker_id = %self.id,
            task_id,
            identifier = %task.identifier(),
            kind = task.kind().name(),
            served,
            "Serving task"
        );

        if let Err(e) = task.set_state(TaskState::Processing) {
            warn!(worker_id = %self.id, task_id, error = %e, "Skipping task");
            return;
        }

        self.stats.increment_active();

        // run on its own tokio task so a panic surfaces as a JoinError
        let span = info_span!("task", task_id, identifier = %task.identifier());
        let processor = Arc::clone(&self.processor);
        let handle = tokio::spawn({
            let task = Arc::clone(&task);
            async move { processor.process(task).await }.instrument(span)
        });
        let outcome = handle.await;

        self.stats.decrement_active();
        let duration = start_time.elapsed();

        if let Err(e) = outcome {
            error!(worker_id = %self.id, task_id, error = %e, "Task processing aborted");
            task.append_error(&format!("task processing aborted: {e}"));
        }

        match task.state() {
            TaskState::Success => {
                self.stats.record_completion(duration);
                info!(
                    worker_id = %self.id,
                    task_id,
                    duration_ms = duration.as_millis(),
                    "Task succeeded"
                );
            }
            state => {
                if state != TaskState::Error {
                    warn!(worker_id = %self.id, task_id, state = %state, "Task left unfinished, marking as error");
                    let _ = task.set_state(TaskState::Error);
                }
                self.stats.record_failure(duration);
                warn!(
                    worker_id = %self.id,
                    task_id,
                    duration_ms = duration.as_millis(),
                    "Task failed"
                );
            }
        }
    }

}

//! In-memory task queue with a bounded handoff.
//!
//! The queue has two halves:
//!
//! - a retained **history** of every task ever pushed, indexed by unique ID
//!   and searched by identifier for status queries;
//! - a bounded **handoff** channel that delivers each pushed task to exactly
//!   one worker.
//!
//! # Ordering
//!
//! `push` assigns IDs, appends to the history and sends to the handoff while
//! holding the history lock, so ID order, history order and delivery order
//! all agree.
//!
//! # Backpressure
//!
//! When every handoff slot is taken, `push` fails with [`QueueError::Full`]
//! instead of waiting. No ID is consumed and the history is untouched.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::task::{Task, TaskState};

/// Default number of tasks that may wait for a worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Every handoff slot is taken.
    #[error("task queue is full ({capacity} tasks waiting)")]
    Full { capacity: usize },

    /// The queue no longer accepts tasks.
    #[error("task queue is closed")]
    Closed,

    /// The task was already pushed once.
    #[error("task already queued with id {0}")]
    AlreadyQueued(u64),
}

struct Inner {
    history: Vec<Arc<Task>>,
    sender: Option<mpsc::Sender<Arc<Task>>>,
}

/// Thread-safe task intake shared by request handlers and workers.
pub struct TaskQueue {
    inner: Mutex<Inner>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<Arc<Task>>>,
    pending: AtomicUsize,
    capacity: usize,
}

impl TaskQueue {
    /// Creates a queue whose handoff holds at most `capacity` waiting tasks.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        Self {
            inner: Mutex::new(Inner {
                history: Vec::new(),
                sender: Some(sender),
            }),
            receiver: tokio::sync::Mutex::new(receiver),
            pending: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Submits a task and returns its unique ID.
    ///
    /// On success the task is in the `Queued` state, visible to lookups and
    /// waiting for a worker. This never waits for a worker to pick it up.
    ///
    /// # Errors
    ///
    /// - `QueueError::Full` if no handoff slot is free
    /// - `QueueError::Closed` after [`close`](Self::close)
    /// - `QueueError::AlreadyQueued` if the task already has an ID
    pub fn push(&self, task: Arc<Task>) -> Result<u64, QueueError> {
        let mut guard = self.inner.lock().expect("task queue lock poisoned");
        // plain reborrow so the sender and history borrows stay disjoint
        let inner = &mut *guard;

        if task.unique_id() != 0 || task.state() != TaskState::Unknown {
            return Err(QueueError::AlreadyQueued(task.unique_id()));
        }

        let sender = inner.sender.as_ref().ok_or(QueueError::Closed)?;
        let permit = sender.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => QueueError::Full {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(()) => QueueError::Closed,
        })?;

        let id = inner.history.len() as u64 + 1;
        if !task.assign_unique_id(id) {
            return Err(QueueError::AlreadyQueued(task.unique_id()));
        }
        task.set_state(TaskState::Queued)
            .map_err(|_| QueueError::AlreadyQueued(id))?;

        inner.history.push(Arc::clone(&task));
        self.pending.fetch_add(1, Ordering::SeqCst);
        permit.send(task);

        debug!(task_id = id, "task queued");
        Ok(id)
    }

    /// Waits for the next task. Each task is returned to exactly one caller.
    ///
    /// Returns `None` once the queue is closed and every queued task has
    /// been handed out.
    pub async fn pop(&self) -> Option<Arc<Task>> {
        let task = self.receiver.lock().await.recv().await?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(task)
    }

    /// Stops accepting new tasks. Tasks already queued can still be popped.
    pub fn close(&self) {
        self.inner
            .lock()
            .expect("task queue lock poisoned")
            .sender
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .expect("task queue lock poisoned")
            .sender
            .is_none()
    }

    /// Looks a task up by unique ID. `0` and unknown IDs return `None`.
    pub fn get_by_unique_id(&self, id: u64) -> Option<Arc<Task>> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.inner
            .lock()
            .expect("task queue lock poisoned")
            .history
            .get(index)
            .cloned()
    }

    /// Returns the most recent task with this identifier.
    pub fn get_by_identifier(&self, identifier: &str) -> Option<Arc<Task>> {
        self.inner
            .lock()
            .expect("task queue lock poisoned")
            .history
            .iter()
            .rev()
            .find(|task| task.identifier() == identifier)
            .cloned()
    }

    /// Snapshot of every task, newest first.
    pub fn list(&self) -> Vec<Arc<Task>> {
        let inner = self.inner.lock().expect("task queue lock poisoned");
        inner.history.iter().rev().cloned().collect()
    }

    /// Number of tasks ever pushed.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("task queue lock poisoned")
            .history
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks pushed but not yet taken by a worker.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("len", &self.len())
            .field("pending", &self.pending())
            .field("capacity", &self.capacity)
            .finish()
    }
}

//! Task intake and the worker pool that drains it.
//!
//! - **TaskQueue**: assigns unique IDs, keeps the history, hands tasks to workers
//! - **WorkerPool**: fixed set of workers running tasks through a [`TaskProcessor`]
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │   Web API    │
//!                      └──────┬───────┘
//!                             │ push
//!                      ┌──────▼───────┐
//!                      │  TaskQueue   │──── history (status queries)
//!                      └──────┬───────┘
//!                             │ pop
//!         ┌───────────────────┼───────────────────┐
//!         │                   │                   │
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 1│         │ Worker 2│         │ Worker N│
//!    └─────────┘         └─────────┘         └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use uroboros::scheduler::{TaskQueue, WorkerPool, WorkerPoolConfig};
//!
//! let queue = Arc::new(TaskQueue::new(1024));
//! let mut pool = WorkerPool::new(WorkerPoolConfig::new(4), Arc::clone(&queue), processor);
//! pool.start()?;
//!
//! let id = queue.push(Arc::new(task))?;
//!
//! pool.shutdown().await?;
//! ```

pub mod queue;
pub mod worker_pool;

pub use queue::{QueueError, TaskQueue, DEFAULT_QUEUE_CAPACITY};
pub use worker_pool::{PoolError, PoolStats, TaskProcessor, WorkerPool, WorkerPoolConfig};

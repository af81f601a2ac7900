//! Task records: what was submitted and how far it got.
//!
//! A [`Task`] is created by the intake from a pull-request URL, pushed to
//! the [`TaskQueue`](crate::scheduler::TaskQueue), processed by exactly one
//! worker, and then kept read-only for status queries.

pub mod log;
pub mod pull_request;
pub mod record;
pub mod state;

pub use log::TaskLogger;
pub use pull_request::StashPullRequest;
pub use record::{Task, TaskKind};
pub use state::{TaskState, TransitionError};

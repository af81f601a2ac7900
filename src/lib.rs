//! uroboros: continuous integration feedback for Stash pull requests.
//!
//! Pull-request URLs submitted over HTTP become tasks in an in-memory queue.
//! A fixed pool of workers takes each task through fetch, clone, checkout,
//! dependency fetch, build, test and lint steps, then posts the outcome as a
//! comment on the pull request.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod pipeline;
pub mod scheduler;
pub mod service;
pub mod stash;
pub mod task;
pub mod web;

pub use config::Config;
pub use error::{ExecError, IntakeError, PipelineError, UpstreamError};
pub use service::Service;
pub use task::{StashPullRequest, Task, TaskState};

//! Per-task logger.
//!
//! Every line a pipeline logs for a task goes both to `tracing` (tagged with
//! the task's ID) and into the task's own buffers, so that status queries can
//! show what happened without access to the process log.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::record::Task;

/// Logger bound to one task.
///
/// - `info` and `warn` lines are appended to the log buffer.
/// - `error` lines are appended to both the log and the error buffer.
/// - `debug` lines only reach `tracing`.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task: Arc<Task>,
}

impl TaskLogger {
    pub fn new(task: Arc<Task>) -> Self {
        Self { task }
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn debug(&self, message: &str) {
        debug!(task_id = self.task.unique_id(), "{}", message);
    }

    pub fn info(&self, message: &str) {
        info!(task_id = self.task.unique_id(), "{}", message);
        self.task.append_log(message);
    }

    pub fn warn(&self, message: &str) {
        warn!(task_id = self.task.unique_id(), "{}", message);
        self.task.append_log(message);
    }

    pub fn error(&self, message: &str) {
        error!(task_id = self.task.unique_id(), "{}", message);
        self.task.append_log(message);
        self.task.append_error(message);
    }

    /// Captured tool output. Kept verbatim in the error buffer only.
    pub fn tool_output(&self, tool: &str, output: &str) {
        debug!(task_id = self.task.unique_id(), tool, "captured tool output");
        self.task.append_error(output);
    }
}

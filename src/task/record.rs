//! The task record shared between the intake, the workers and status queries.

use std::sync::{OnceLock, RwLock};

use chrono::{DateTime, Utc};

use super::pull_request::StashPullRequest;
use super::state::{TaskState, TransitionError};

/// Kind of work a task describes, paired with its payload.
///
/// Each kind is processed by its own pipeline, selected at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    StashPullRequest(StashPullRequest),
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::StashPullRequest(_) => "stash_pull_request",
        }
    }

    pub fn identifier(&self) -> String {
        match self {
            TaskKind::StashPullRequest(pr) => pr.identifier(),
        }
    }

    pub fn title(&self) -> String {
        match self {
            TaskKind::StashPullRequest(pr) => pr.title(),
        }
    }
}

#[derive(Debug, Default)]
struct Progress {
    state: TaskState,
    logs: Vec<String>,
    errors: Vec<String>,
    source_branch: Option<String>,
}

/// One build request and its mutable progress.
///
/// The unique ID is set exactly once by the queue. State, log lines and
/// error lines live behind a single lock so a reader always sees whole
/// lines and a state consistent with them.
#[derive(Debug)]
pub struct Task {
    unique_id: OnceLock<u64>,
    identifier: String,
    title: String,
    kind: TaskKind,
    created_at: DateTime<Utc>,
    progress: RwLock<Progress>,
}

impl Task {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            unique_id: OnceLock::new(),
            identifier: kind.identifier(),
            title: kind.title(),
            kind,
            created_at: Utc::now(),
            progress: RwLock::new(Progress::default()),
        }
    }

    /// Creates a pull-request build task.
    pub fn stash_pull_request(pull_request: StashPullRequest) -> Self {
        Self::new(TaskKind::StashPullRequest(pull_request))
    }

    /// Unique ID, or `0` while the task has not been pushed.
    pub fn unique_id(&self) -> u64 {
        self.unique_id.get().copied().unwrap_or(0)
    }

    /// Assigns the unique ID. Returns false if one was already assigned.
    pub(crate) fn assign_unique_id(&self, id: u64) -> bool {
        self.unique_id.set(id).is_ok()
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> TaskState {
        self.progress.read().expect("task lock poisoned").state
    }

    /// Moves the task to `next`, rejecting anything but a forward step.
    pub fn set_state(&self, next: TaskState) -> Result<(), TransitionError> {
        let mut progress = self.progress.write().expect("task lock poisoned");
        if !progress.state.can_transition_to(next) {
            return Err(TransitionError {
                from: progress.state,
                to: next,
            });
        }
        progress.state = next;
        Ok(())
    }

    pub fn source_branch(&self) -> Option<String> {
        self.progress
            .read()
            .expect("task lock poisoned")
            .source_branch
            .clone()
    }

    pub fn set_source_branch(&self, branch: impl Into<String>) {
        self.progress.write().expect("task lock poisoned").source_branch = Some(branch.into());
    }

    /// Appends informational text, one entry per line.
    pub fn append_log(&self, text: &str) {
        let mut progress = self.progress.write().expect("task lock poisoned");
        progress.logs.extend(text.lines().map(str::to_string));
    }

    /// Appends failure diagnostics, one entry per line.
    pub fn append_error(&self, text: &str) {
        let mut progress = self.progress.write().expect("task lock poisoned");
        progress.errors.extend(text.lines().map(str::to_string));
    }

    pub fn logs(&self) -> Vec<String> {
        self.progress.read().expect("task lock poisoned").logs.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.progress.read().expect("task lock poisoned").errors.clone()
    }

    pub fn log_text(&self) -> String {
        self.logs().join("\n")
    }

    pub fn error_text(&self) -> String {
        self.errors().join("\n")
    }
}

//! Task lifecycle states.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a task.
///
/// States only move forward: `Queued -> Processing -> {Error | Success}`.
/// `Unknown` is the value of a record that has not been pushed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Unknown,
    Queued,
    Processing,
    Error,
    Success,
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid task state transition from '{from}' to '{to}'")]
pub struct TransitionError {
    pub from: TaskState,
    pub to: TaskState,
}

impl TaskState {
    /// Returns whether the state is final.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Error | TaskState::Success)
    }

    /// Returns whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Unknown, TaskState::Queued)
                | (TaskState::Queued, TaskState::Processing)
                | (TaskState::Processing, TaskState::Error)
                | (TaskState::Processing, TaskState::Success)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Unknown => "unknown",
            TaskState::Queued => "queued",
            TaskState::Processing => "processing",
            TaskState::Error => "error",
            TaskState::Success => "success",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskState; 5] = [
        TaskState::Unknown,
        TaskState::Queued,
        TaskState::Processing,
        TaskState::Error,
        TaskState::Success,
    ];

    #[test]
    fn test_forward_transitions() {
        assert!(TaskState::Unknown.can_transition_to(TaskState::Queued));
        assert!(TaskState::Queued.can_transition_to(TaskState::Processing));
        assert!(TaskState::Processing.can_transition_to(TaskState::Success));
        assert!(TaskState::Processing.can_transition_to(TaskState::Error));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in [TaskState::Error, TaskState::Success] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_no_skipping_or_reversal() {
        assert!(!TaskState::Queued.can_transition_to(TaskState::Success));
        assert!(!TaskState::Queued.can_transition_to(TaskState::Error));
        assert!(!TaskState::Processing.can_transition_to(TaskState::Queued));
        assert!(!TaskState::Unknown.can_transition_to(TaskState::Processing));
        assert!(!TaskState::Queued.can_transition_to(TaskState::Queued));
    }

    #[test]
    fn test_display_and_serde_names() {
        assert_eq!(TaskState::Processing.to_string(), "processing");
        let json = serde_json::to_string(&TaskState::Success).expect("serialize");
        assert_eq!(json, "\"success\"");
    }
}

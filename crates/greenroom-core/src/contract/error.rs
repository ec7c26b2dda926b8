//! Error types for the message contract.

use super::task::{TaskId, TaskStatus};

/// A contract violation: the offending field path and why it was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {path}: {reason}")]
pub struct ValidationError {
    /// Dotted field path, e.g. `artifacts[1].media_type`.
    pub path: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Re-root this error under `parent` (`name` becomes `parent.name`).
    pub fn within(self, parent: &str) -> Self {
        Self {
            path: format!("{parent}.{}", self.path),
            reason: self.reason,
        }
    }
}

/// Rejected mutation of a [`Task`](super::task::Task).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("update for task {actual} applied to task {expected}")]
    WrongTask { expected: TaskId, actual: TaskId },

    #[error("task {task_id} is already {status}; rejected {attempted}")]
    AlreadyTerminal {
        task_id: TaskId,
        status: TaskStatus,
        attempted: TaskStatus,
    },

    #[error("task {task_id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task {task_id}: expected update seq {expected}, got {actual}")]
    OutOfOrder {
        task_id: TaskId,
        expected: u64,
        actual: u64,
    },

    #[error("task {task_id}: update timestamp went backwards")]
    TimestampRegressed { task_id: TaskId },

    #[error("task {task_id}: result can only be attached to a completed task (status {status})")]
    NotCompleted { task_id: TaskId, status: TaskStatus },

    #[error("task {task_id} already has a result attached")]
    ResultAlreadyAttached { task_id: TaskId },

    #[error("task {task_id}: {source}")]
    Invalid {
        task_id: TaskId,
        #[source]
        source: ValidationError,
    },
}

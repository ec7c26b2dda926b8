//! Error taxonomy for remote calls made by the agent client.

use crate::contract::{LifecycleFailure, TaskId, TaskStatus, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The caller built a payload that violates the message contract.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{endpoint} unreachable after {attempts} attempt(s): {reason}")]
    Unreachable {
        endpoint: String,
        attempts: u32,
        reason: String,
    },

    /// The endpoint answered, but not with something the contract accepts.
    #[error("protocol error from {endpoint}: {reason}")]
    Protocol { endpoint: String, reason: String },

    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("task {task_id} has no result yet (status {status})")]
    NotReady { task_id: TaskId, status: TaskStatus },

    #[error("task {task_id} failed: {failure}")]
    TaskFailed {
        task_id: TaskId,
        failure: LifecycleFailure,
    },

    #[error("http client setup failed: {0}")]
    Setup(String),
}

impl ClientError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Unreachable { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }

    pub(crate) fn protocol(endpoint: impl ToString, reason: impl Into<String>) -> Self {
        ClientError::Protocol {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

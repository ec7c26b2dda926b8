use std::path::PathBuf;

use crate::client::ClientError;
use crate::contract::{LifecycleFailure, TaskId, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("cannot read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid scenario: {0}")]
    Invalid(#[from] ValidationError),
}

pub type ScenarioResult<T> = std::result::Result<T, ScenarioError>;

/// Orchestration failures. All of them mean "no score": the harness, not the
/// participant, is at fault or could not tell.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error("role '{role}' not ready after {waited_ms}ms: {cause}")]
    StartupTimeout {
        role: String,
        waited_ms: u64,
        cause: String,
    },

    #[error("scenario has no role '{0}'")]
    UnknownRole(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("task {task_id}: protocol violation: {reason}")]
    Protocol { task_id: TaskId, reason: String },

    /// The task did not finish within its budget. The remote task may still
    /// be running.
    #[error("task {task_id} timed out: {detail}")]
    Timeout { task_id: TaskId, detail: String },

    #[error("task {task_id} produced no result: {failure}")]
    Lifecycle {
        task_id: TaskId,
        failure: LifecycleFailure,
    },

    /// The run was interrupted (Ctrl-C, SIGTERM). Teardown still ran.
    #[error("interrupted: {detail}")]
    Interrupted {
        task_id: Option<TaskId>,
        detail: String,
    },
}

impl SupervisorError {
    /// Process exit code for the CLI. Distinct from the benchmark verdict
    /// codes 0 and 1.
    pub fn exit_code(&self) -> u8 {
        2
    }

    /// Short machine-readable tag.
    pub fn kind(&self) -> &'static str {
        match self {
            SupervisorError::Scenario(_) => "scenario",
            SupervisorError::StartupTimeout { .. } => "startup_timeout",
            SupervisorError::UnknownRole(_) => "unknown_role",
            SupervisorError::Client(ClientError::Timeout { .. }) => "timeout",
            SupervisorError::Client(ClientError::Unreachable { .. }) => "unreachable",
            SupervisorError::Client(_) => "protocol",
            SupervisorError::Protocol { .. } => "protocol",
            SupervisorError::Timeout { .. } => "timeout",
            SupervisorError::Lifecycle { .. } => "lifecycle_failure",
            SupervisorError::Interrupted { .. } => "interrupted",
        }
    }
}

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

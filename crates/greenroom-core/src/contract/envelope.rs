//! Request and response envelopes exchanged between roles.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ValidationError;
use super::failure::LifecycleFailure;
use super::task::{TaskId, TaskStatus};

/// Free-form benchmark configuration, passed through opaquely.
pub type AssessmentConfig = serde_json::Map<String, Value>;

/// Absolute `http`/`https` base URL of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint(Url);

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let url = Url::parse(raw)
            .map_err(|e| ValidationError::new("endpoint", format!("'{raw}': {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ValidationError::new(
                    "endpoint",
                    format!("unsupported scheme '{other}'"),
                ))
            }
        }
        if url.host_str().is_none() {
            return Err(ValidationError::new("endpoint", format!("'{raw}' has no host")));
        }
        Ok(Self(url))
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    /// `path` appended to the base URL, e.g. `/tasks/{id}`.
    pub fn join(&self, path: &str) -> String {
        let base = self.0.as_str().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Endpoint> for String {
    fn from(value: Endpoint) -> Self {
        value.0.as_str().trim_end_matches('/').to_string()
    }
}

impl std::str::FromStr for Endpoint {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str().trim_end_matches('/'))
    }
}

/// A participant role and where to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub role: String,
    pub endpoint: Endpoint,
}

/// Envelope that creates a task on the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub task_id: TaskId,
    /// Role name of the evaluator receiving the task.
    pub role: String,
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub config: AssessmentConfig,
}

impl TaskSubmission {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.role.trim().is_empty() {
            return Err(ValidationError::new("role", "must not be empty"));
        }
        let mut seen = HashSet::new();
        for (i, p) in self.participants.iter().enumerate() {
            let at = format!("participants[{i}].role");
            if p.role.trim().is_empty() {
                return Err(ValidationError::new(at, "must not be empty"));
            }
            if !seen.insert(p.role.as_str()) {
                return Err(ValidationError::new(at, format!("duplicate role '{}'", p.role)));
            }
        }
        Ok(())
    }

    pub fn participant(&self, role: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.role == role)
    }
}

/// Acknowledgement returned by `POST /tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAck {
    pub task_id: TaskId,
}

/// Response of `POST /tasks/{id}/cancel`; `cancelled` is false when the task
/// was already terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    pub task_id: TaskId,
    pub cancelled: bool,
}

/// Evaluator → participant request sent during the run hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantMessage {
    pub task_id: TaskId,
    pub sender: String,
    pub payload: Value,
}

impl ParticipantMessage {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sender.trim().is_empty() {
            return Err(ValidationError::new("sender", "must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantReply {
    pub task_id: TaskId,
    pub payload: Value,
}

/// Summary view of a task served by `GET /tasks/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub update_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<LifecycleFailure>,
}

/// Self-description served by `GET /card`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub ready: bool,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<LifecycleFailure>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
            failure: None,
        }
    }
}

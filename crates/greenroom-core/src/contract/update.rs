//! Status updates streamed by the evaluator while a task progresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ValidationError;
use super::failure::LifecycleFailure;
use super::task::{TaskId, TaskStatus};

/// One progress notification for a task.
///
/// `seq` starts at 1 and increases by one per update; consumers use it to
/// resume a stream and to detect gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub task_id: TaskId,
    pub seq: u64,
    pub status: TaskStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl StatusUpdate {
    pub fn new(task_id: TaskId, seq: u64, status: TaskStatus, message: impl Into<String>) -> Self {
        Self {
            task_id,
            seq,
            status,
            message: message.into(),
            timestamp: Utc::now(),
            progress: None,
            payload: None,
        }
    }

    /// A terminal FAILED update carrying `failure` as its payload.
    pub fn failed(task_id: TaskId, seq: u64, failure: &LifecycleFailure) -> Self {
        Self::new(task_id, seq, TaskStatus::Failed, failure.to_string())
            .with_payload(failure.to_payload())
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Decode the failure description of a FAILED update.
    pub fn failure(&self) -> Option<LifecycleFailure> {
        if self.status != TaskStatus::Failed {
            return None;
        }
        self.payload
            .as_ref()
            .and_then(|p| serde_json::from_value(p.clone()).ok())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.seq == 0 {
            return Err(ValidationError::new("seq", "must start at 1"));
        }
        if self.message.trim().is_empty() {
            return Err(ValidationError::new("message", "must not be empty"));
        }
        if let Some(p) = self.progress {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(ValidationError::new(
                    "progress",
                    format!("{p} is outside [0, 1]"),
                ));
            }
        }
        Ok(())
    }
}

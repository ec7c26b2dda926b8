//! Terminal failure description carried by a FAILED status update.

use serde::{Deserialize, Serialize};

use super::task::TaskStatus;

/// The evaluator hook that was active when an assessment failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    Setup,
    Run,
    Evaluate,
}

impl Hook {
    /// The hook that owns (or is about to own) a task in `status`.
    pub fn for_status(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Created | TaskStatus::Setup => Hook::Setup,
            TaskStatus::Running => Hook::Run,
            TaskStatus::Evaluating | TaskStatus::Completed | TaskStatus::Failed => Hook::Evaluate,
        }
    }
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Hook::Setup => "setup",
            Hook::Run => "run",
            Hook::Evaluate => "evaluate",
        };
        write!(f, "{s}")
    }
}

/// Why the hook failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The hook returned an error.
    Error,
    /// Cancellation was observed at a checkpoint.
    Cancelled,
    /// A remote call or the watcher exceeded its time budget.
    Timeout,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::Error => "error",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// An assessment ended in FAILED and produced no result.
///
/// This is "no score", never "score = 0".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{hook} hook failed ({reason}): {detail}")]
pub struct LifecycleFailure {
    pub hook: Hook,
    pub reason: FailureReason,
    pub detail: String,
}

impl LifecycleFailure {
    pub fn new(hook: Hook, reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            hook,
            reason,
            detail: detail.into(),
        }
    }

    pub fn cancelled(hook: Hook) -> Self {
        Self::new(hook, FailureReason::Cancelled, "cancellation requested")
    }

    pub fn is_timeout(&self) -> bool {
        self.reason == FailureReason::Timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason == FailureReason::Cancelled
    }

    /// The payload attached to the FAILED status update.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "hook": self.hook,
            "reason": self.reason,
            "detail": self.detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_payload_shape() {
        let failure = LifecycleFailure::new(Hook::Run, FailureReason::Timeout, "participant silent");
        let payload = failure.to_payload();
        assert_eq!(payload["hook"], "run");
        assert_eq!(payload["reason"], "timeout");

        let back: LifecycleFailure = serde_json::from_value(payload).unwrap();
        assert_eq!(back, failure);
        assert!(back.is_timeout());
    }

    #[test]
    fn test_hook_for_status() {
        assert_eq!(Hook::for_status(TaskStatus::Created), Hook::Setup);
        assert_eq!(Hook::for_status(TaskStatus::Running), Hook::Run);
        assert_eq!(Hook::for_status(TaskStatus::Evaluating), Hook::Evaluate);
    }

    #[test]
    fn test_display() {
        let failure = LifecycleFailure::cancelled(Hook::Setup);
        assert_eq!(
            failure.to_string(),
            "setup hook failed (cancelled): cancellation requested"
        );
    }
}

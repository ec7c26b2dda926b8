//! Task identity, status and the transition rules for one assessment run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{TransitionError, ValidationError};
use super::failure::{Hook, LifecycleFailure};
use super::result::AssessmentResult;
use super::update::StatusUpdate;

/// Globally unique identifier of an assessment task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(TaskId)
            .map_err(|e| ValidationError::new("task_id", e.to_string()))
    }
}

/// Lifecycle status of a task.
///
/// Happy path: `created → setup → running → evaluating → completed`.
/// `failed` is reachable from every non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Setup,
    Running,
    Evaluating,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    fn phase_index(self) -> Option<u8> {
        match self {
            TaskStatus::Created => Some(0),
            TaskStatus::Setup => Some(1),
            TaskStatus::Running => Some(2),
            TaskStatus::Evaluating => Some(3),
            TaskStatus::Completed => Some(4),
            TaskStatus::Failed => None,
        }
    }

    /// Whether an update carrying `next` may follow an update carrying `self`.
    ///
    /// Repeating a non-terminal status is allowed (checkpoints); skipping a
    /// phase or moving backwards is not.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == TaskStatus::Failed {
            return true;
        }
        match (self.phase_index(), next.phase_index()) {
            (Some(from), Some(to)) => to == from || to == from + 1,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Setup => "setup",
            TaskStatus::Running => "running",
            TaskStatus::Evaluating => "evaluating",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of work for one assessment run.
///
/// All mutation goes through [`Task::apply`], [`Task::complete`] and
/// [`Task::inject_failure`], which enforce ordering and monotonic status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    updates: Vec<StatusUpdate>,
    result: Option<AssessmentResult>,
    failure: Option<LifecycleFailure>,
}

impl Task {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            status: TaskStatus::Created,
            created_at: Utc::now(),
            updates: Vec::new(),
            result: None,
            failure: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Updates in emission order.
    pub fn updates(&self) -> &[StatusUpdate] {
        &self.updates
    }

    pub fn result(&self) -> Option<&AssessmentResult> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&LifecycleFailure> {
        self.failure.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Sequence number of the most recent update (0 when none).
    pub fn last_seq(&self) -> u64 {
        self.updates.last().map(|u| u.seq).unwrap_or(0)
    }

    pub fn next_seq(&self) -> u64 {
        self.last_seq() + 1
    }

    /// Earliest timestamp the next update may carry.
    pub fn min_next_timestamp(&self) -> DateTime<Utc> {
        self.updates
            .last()
            .map(|u| u.timestamp)
            .unwrap_or(self.created_at)
    }

    /// Append one status update.
    ///
    /// The update must belong to this task, carry the next sequence number, not
    /// move time backwards and respect [`TaskStatus::can_transition_to`]. The
    /// first update may repeat `created`.
    pub fn apply(&mut self, update: StatusUpdate) -> Result<(), TransitionError> {
        self.check(&update)?;
        if update.status == TaskStatus::Failed {
            self.failure = update.failure();
        }
        self.status = update.status;
        self.updates.push(update);
        Ok(())
    }

    /// Apply the `completed` update and attach the result in one step.
    pub fn complete(
        &mut self,
        update: StatusUpdate,
        result: AssessmentResult,
    ) -> Result<(), TransitionError> {
        if update.status != TaskStatus::Completed {
            return Err(TransitionError::NotCompleted {
                task_id: self.id,
                status: update.status,
            });
        }
        self.check_result(&result)?;
        self.apply(update)?;
        self.result = Some(result);
        Ok(())
    }

    /// Attach the result to a task that has already observed `completed`.
    pub fn attach_result(&mut self, result: AssessmentResult) -> Result<(), TransitionError> {
        if self.status != TaskStatus::Completed {
            return Err(TransitionError::NotCompleted {
                task_id: self.id,
                status: self.status,
            });
        }
        self.check_result(&result)?;
        self.result = Some(result);
        Ok(())
    }

    /// Force the task into `failed` from outside the evaluator (timeout or
    /// cancellation seen by a watcher). Returns the synthesised update.
    pub fn inject_failure(
        &mut self,
        failure: LifecycleFailure,
    ) -> Result<StatusUpdate, TransitionError> {
        let mut update = StatusUpdate::failed(self.id, self.next_seq(), &failure);
        let floor = self.min_next_timestamp();
        if update.timestamp < floor {
            update.timestamp = floor;
        }
        self.apply(update.clone())?;
        Ok(update)
    }

    /// Hook responsible for the task's current phase.
    pub fn current_hook(&self) -> Hook {
        Hook::for_status(self.status)
    }

    fn check(&self, update: &StatusUpdate) -> Result<(), TransitionError> {
        if update.task_id != self.id {
            return Err(TransitionError::WrongTask {
                expected: self.id,
                actual: update.task_id,
            });
        }
        update.validate().map_err(|source| TransitionError::Invalid {
            task_id: self.id,
            source,
        })?;
        if update.seq != self.next_seq() {
            return Err(TransitionError::OutOfOrder {
                task_id: self.id,
                expected: self.next_seq(),
                actual: update.seq,
            });
        }
        if let Some(last) = self.updates.last() {
            if update.timestamp < last.timestamp {
                return Err(TransitionError::TimestampRegressed { task_id: self.id });
            }
        }
        if self.status.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                task_id: self.id,
                status: self.status,
                attempted: update.status,
            });
        }
        if !self.status.can_transition_to(update.status) {
            return Err(TransitionError::IllegalTransition {
                task_id: self.id,
                from: self.status,
                to: update.status,
            });
        }
        Ok(())
    }

    fn check_result(&self, result: &AssessmentResult) -> Result<(), TransitionError> {
        if self.result.is_some() {
            return Err(TransitionError::ResultAlreadyAttached { task_id: self.id });
        }
        if result.task_id != self.id {
            return Err(TransitionError::WrongTask {
                expected: self.id,
                actual: result.task_id,
            });
        }
        result.validate().map_err(|source| TransitionError::Invalid {
            task_id: self.id,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::failure::FailureReason;

    fn update(task: &Task, status: TaskStatus) -> StatusUpdate {
        StatusUpdate::new(task.id(), task.next_seq(), status, status.as_str())
    }

    #[test]
    fn test_status_transitions() {
        use TaskStatus::*;
        assert!(Created.can_transition_to(Setup));
        assert!(Running.can_transition_to(Running));
        assert!(Evaluating.can_transition_to(Completed));
        assert!(Setup.can_transition_to(Failed));
        assert!(!Created.can_transition_to(Running));
        assert!(!Running.can_transition_to(Setup));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn test_happy_path_reaches_completed_with_result() {
        let mut task = Task::new(TaskId::new());
        for status in [
            TaskStatus::Created,
            TaskStatus::Setup,
            TaskStatus::Running,
            TaskStatus::Running,
            TaskStatus::Evaluating,
        ] {
            let u = update(&task, status);
            task.apply(u).unwrap();
        }
        let done = update(&task, TaskStatus::Completed);
        let result = AssessmentResult::new(task.id(), 1.0, true);
        task.complete(done, result.clone()).unwrap();

        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.result(), Some(&result));
        assert_eq!(task.updates().len(), 6);
        assert_eq!(task.last_seq(), 6);
    }

    #[test]
    fn test_terminal_task_rejects_further_updates() {
        let mut task = Task::new(TaskId::new());
        let failure = LifecycleFailure::new(Hook::Setup, FailureReason::Error, "boom");
        task.inject_failure(failure.clone()).unwrap();
        assert_eq!(task.failure(), Some(&failure));

        let late = update(&task, TaskStatus::Completed);
        let err = task.apply(late).unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyTerminal { .. }));
        assert!(task.result().is_none());
    }

    #[test]
    fn test_skipping_a_phase_is_illegal() {
        let mut task = Task::new(TaskId::new());
        let u = update(&task, TaskStatus::Evaluating);
        let err = task.apply(u).unwrap_err();
        assert!(matches!(err, TransitionError::IllegalTransition { .. }));
    }

    #[test]
    fn test_out_of_order_seq_rejected() {
        let mut task = Task::new(TaskId::new());
        let u = StatusUpdate::new(task.id(), 2, TaskStatus::Created, "created");
        let err = task.apply(u).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::OutOfOrder {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_timestamp_regression_rejected() {
        let mut task = Task::new(TaskId::new());
        let first = update(&task, TaskStatus::Created);
        let earlier = first.timestamp - chrono::Duration::seconds(5);
        task.apply(first).unwrap();

        let mut second = update(&task, TaskStatus::Setup);
        second.timestamp = earlier;
        let err = task.apply(second).unwrap_err();
        assert!(matches!(err, TransitionError::TimestampRegressed { .. }));
    }

    #[test]
    fn test_attach_result_requires_completed_and_is_once_only() {
        let mut task = Task::new(TaskId::new());
        let result = AssessmentResult::new(task.id(), 0.5, false);
        assert!(matches!(
            task.attach_result(result.clone()),
            Err(TransitionError::NotCompleted { .. })
        ));

        for status in [
            TaskStatus::Setup,
            TaskStatus::Running,
            TaskStatus::Evaluating,
            TaskStatus::Completed,
        ] {
            let u = update(&task, status);
            task.apply(u).unwrap();
        }
        task.attach_result(result.clone()).unwrap();
        assert!(matches!(
            task.attach_result(result),
            Err(TransitionError::ResultAlreadyAttached { .. })
        ));
    }

    #[test]
    fn test_update_for_other_task_rejected() {
        let mut task = Task::new(TaskId::new());
        let stray = StatusUpdate::new(TaskId::new(), 1, TaskStatus::Created, "created");
        assert!(matches!(
            task.apply(stray),
            Err(TransitionError::WrongTask { .. })
        ));
    }

    #[test]
    fn test_task_id_parse() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<TaskId>().is_err());
    }
}

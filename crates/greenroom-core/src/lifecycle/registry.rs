//! Evaluator-side task registry.
//!
//! The executor is the only writer; HTTP handlers read snapshots and may
//! request cancellation. Sequence numbers and timestamps are assigned under
//! the write lock so updates are recorded in emission order.
//!
//! Terminal tasks stay readable for a retention window, so results can be
//! fetched repeatedly, and are evicted on the next registration after it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::RwLock;

use crate::contract::{
    AssessmentResult, LifecycleFailure, StatusUpdate, Task, TaskId, TaskSnapshot, TaskStatus,
};

use super::benchmark::Checkpoint;
use super::cancel::{cancellation, CancelHandle, CancelSignal};
use super::error::{LifecycleError, LifecycleResult};

/// How long a terminal task stays readable by default.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

struct TaskEntry {
    task: Task,
    cancel: CancelHandle,
    finished_at: Option<Instant>,
}

impl TaskEntry {
    fn mark_if_terminal(&mut self) {
        if self.finished_at.is_none() && self.task.is_terminal() {
            self.finished_at = Some(Instant::now());
        }
    }

    fn expired(&self, now: Instant, retention: Duration) -> bool {
        self.finished_at
            .is_some_and(|at| now.saturating_duration_since(at) >= retention)
    }
}

/// Answer to "may I have the result of this task?".
#[derive(Debug, Clone, PartialEq)]
pub enum ResultLookup {
    Ready(AssessmentResult),
    Failed(LifecycleFailure),
    Pending(TaskStatus),
}

#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<RwLock<HashMap<TaskId, TaskEntry>>>,
    retention: Duration,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Drop terminal tasks older than the retention window. Returns how
    /// many were evicted.
    pub async fn prune(&self) -> usize {
        let mut tasks = self.inner.write().await;
        evict_expired(&mut tasks, self.retention)
    }

    /// Create the task and record its `created` update.
    pub async fn register(&self, task_id: TaskId) -> LifecycleResult<CancelSignal> {
        let mut tasks = self.inner.write().await;
        let evicted = evict_expired(&mut tasks, self.retention);
        if evicted > 0 {
            tracing::debug!(evicted, "evicted finished tasks");
        }
        if tasks.contains_key(&task_id) {
            return Err(LifecycleError::Duplicate(task_id));
        }
        let mut task = Task::new(task_id);
        let created = StatusUpdate::new(task_id, task.next_seq(), TaskStatus::Created, "task accepted");
        let created = clamped(&task, created);
        task.apply(created)?;
        let (handle, signal) = cancellation();
        tasks.insert(
            task_id,
            TaskEntry {
                task,
                cancel: handle,
                finished_at: None,
            },
        );
        Ok(signal)
    }

    /// Append an update for `status`, assigning the next sequence number.
    pub async fn record(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        checkpoint: Checkpoint,
    ) -> LifecycleResult<StatusUpdate> {
        let mut tasks = self.inner.write().await;
        let entry = tasks
            .get_mut(&task_id)
            .ok_or(LifecycleError::UnknownTask(task_id))?;
        let mut update = StatusUpdate::new(task_id, entry.task.next_seq(), status, checkpoint.message);
        update.progress = checkpoint.progress;
        update.payload = checkpoint.payload;
        let update = clamped(&entry.task, update);
        entry.task.apply(update.clone())?;
        entry.mark_if_terminal();
        Ok(update)
    }

    /// Record `completed` and attach the result atomically.
    pub async fn complete(
        &self,
        task_id: TaskId,
        result: AssessmentResult,
    ) -> LifecycleResult<StatusUpdate> {
        let mut tasks = self.inner.write().await;
        let entry = tasks
            .get_mut(&task_id)
            .ok_or(LifecycleError::UnknownTask(task_id))?;
        let update = StatusUpdate::new(
            task_id,
            entry.task.next_seq(),
            TaskStatus::Completed,
            format!("assessment completed with score {}", result.score),
        )
        .with_progress(1.0)
        .with_payload(json!({ "score": result.score, "passed": result.passed }));
        let update = clamped(&entry.task, update);
        entry.task.complete(update.clone(), result)?;
        entry.mark_if_terminal();
        Ok(update)
    }

    pub async fn fail(
        &self,
        task_id: TaskId,
        failure: LifecycleFailure,
    ) -> LifecycleResult<StatusUpdate> {
        let mut tasks = self.inner.write().await;
        let entry = tasks
            .get_mut(&task_id)
            .ok_or(LifecycleError::UnknownTask(task_id))?;
        let update = entry.task.inject_failure(failure)?;
        entry.mark_if_terminal();
        Ok(update)
    }

    /// Request cooperative cancellation. `None` for unknown tasks, `Some(false)`
    /// when the task is already terminal.
    pub async fn cancel(&self, task_id: TaskId) -> Option<bool> {
        let tasks = self.inner.read().await;
        let entry = tasks.get(&task_id)?;
        if entry.task.is_terminal() {
            return Some(false);
        }
        entry.cancel.cancel();
        Some(true)
    }

    pub async fn snapshot(&self, task_id: TaskId) -> Option<TaskSnapshot> {
        let tasks = self.inner.read().await;
        tasks.get(&task_id).map(|entry| TaskSnapshot {
            task_id,
            status: entry.task.status(),
            created_at: entry.task.created_at(),
            update_count: entry.task.updates().len(),
            failure: entry.task.failure().cloned(),
        })
    }

    pub async fn updates_after(&self, task_id: TaskId, after: u64) -> Option<Vec<StatusUpdate>> {
        let tasks = self.inner.read().await;
        tasks.get(&task_id).map(|entry| {
            entry
                .task
                .updates()
                .iter()
                .filter(|u| u.seq > after)
                .cloned()
                .collect()
        })
    }

    pub async fn result(&self, task_id: TaskId) -> Option<ResultLookup> {
        let tasks = self.inner.read().await;
        let task = &tasks.get(&task_id)?.task;
        Some(match (task.result(), task.failure()) {
            (Some(result), _) => ResultLookup::Ready(result.clone()),
            (None, Some(failure)) => ResultLookup::Failed(failure.clone()),
            (None, None) => ResultLookup::Pending(task.status()),
        })
    }

    pub async fn task(&self, task_id: TaskId) -> Option<Task> {
        self.inner.read().await.get(&task_id).map(|e| e.task.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

fn evict_expired(tasks: &mut HashMap<TaskId, TaskEntry>, retention: Duration) -> usize {
    let now = Instant::now();
    let before = tasks.len();
    tasks.retain(|_, entry| !entry.expired(now, retention));
    before - tasks.len()
}

fn clamped(task: &Task, mut update: StatusUpdate) -> StatusUpdate {
    let floor = task.min_next_timestamp();
    if update.timestamp < floor {
        update.timestamp = floor;
    }
    update
}

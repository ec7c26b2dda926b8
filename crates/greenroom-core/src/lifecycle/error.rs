use crate::contract::{TaskId, TransitionError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("task {0} already exists")]
    Duplicate(TaskId),

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

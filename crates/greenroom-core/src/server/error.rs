use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::contract::{ErrorBody, LifecycleFailure, TaskId, TaskStatus};

/// Failure to start or run the HTTP listener.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("bound address is not a valid endpoint: {0}")]
    Endpoint(String),
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// A non-2xx answer carrying an [`ErrorBody`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::new(code, message),
        }
    }

    pub fn unknown_task(task_id: TaskId) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "unknown_task",
            format!("no task {task_id}"),
        )
    }

    pub fn not_ready(task_id: TaskId, status: TaskStatus) -> Self {
        let mut err = Self::new(
            StatusCode::CONFLICT,
            "not_ready",
            format!("task {task_id} is {status}"),
        );
        err.body.status = Some(status);
        err
    }

    pub fn task_failed(task_id: TaskId, failure: LifecycleFailure) -> Self {
        let mut err = Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "task_failed",
            format!("task {task_id} failed: {failure}"),
        );
        err.body.status = Some(TaskStatus::Failed);
        err.body.failure = Some(failure);
        err
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

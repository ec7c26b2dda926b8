//! HTTP handlers binding the message contract to JSON routes.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Notify;

use crate::contract::{
    AgentCard, Artifact, AssessmentResult, CancelAck, HealthReport, ParticipantMessage,
    ParticipantReply, StatusUpdate, SubmitAck, TaskId, TaskSnapshot, TaskSubmission,
};
use crate::lifecycle::{GreenExecutor, LifecycleError, ResultLookup};

use super::error::ApiError;
use super::participant::ParticipantAgent;

pub(crate) struct HostState {
    pub card: AgentCard,
    pub evaluator: Option<GreenExecutor>,
    pub participant: Option<Arc<dyn ParticipantAgent>>,
    pub shutdown: Arc<Notify>,
}

type Shared = State<Arc<HostState>>;

pub(crate) fn router(state: Arc<HostState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/card", get(card))
        .route("/shutdown", post(shutdown))
        .route("/tasks", post(submit_task))
        .route("/tasks/:task_id", get(task_snapshot))
        .route("/tasks/:task_id/updates", get(task_updates))
        .route("/tasks/:task_id/result", get(task_result))
        .route("/tasks/:task_id/artifacts/:name", get(task_artifact))
        .route("/tasks/:task_id/cancel", post(cancel_task))
        .route("/message", post(message))
        .with_state(state)
}

async fn health() -> Json<HealthReport> {
    Json(HealthReport { ready: true })
}

async fn card(State(state): Shared) -> Json<AgentCard> {
    Json(state.card.clone())
}

async fn shutdown(State(state): Shared) -> (StatusCode, Json<serde_json::Value>) {
    tracing::info!(agent = %state.card.name, "shutdown requested");
    state.shutdown.notify_one();
    (StatusCode::ACCEPTED, Json(json!({ "shutting_down": true })))
}

fn evaluator(state: &HostState) -> Result<&GreenExecutor, ApiError> {
    state.evaluator.as_ref().ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "not_an_evaluator",
            format!("agent '{}' does not accept tasks", state.card.name),
        )
    })
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    raw.parse()
        .map_err(|e: crate::contract::ValidationError| {
            ApiError::new(StatusCode::BAD_REQUEST, "invalid_task_id", e.to_string())
        })
}

async fn submit_task(
    State(state): Shared,
    body: Result<Json<TaskSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitAck>), ApiError> {
    let executor = evaluator(&state)?;
    let Json(submission) = body.map_err(|e| {
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_envelope", e.body_text())
    })?;
    let task_id = submission.task_id;
    match executor.submit(submission).await {
        Ok(_) => Ok((StatusCode::ACCEPTED, Json(SubmitAck { task_id }))),
        Err(LifecycleError::Invalid(e)) => Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_envelope",
            e.to_string(),
        )),
        Err(LifecycleError::Duplicate(id)) => Err(ApiError::new(
            StatusCode::CONFLICT,
            "duplicate_task",
            format!("task {id} already exists"),
        )),
        Err(e) => Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            e.to_string(),
        )),
    }
}

async fn task_snapshot(
    State(state): Shared,
    Path(raw): Path<String>,
) -> Result<Json<TaskSnapshot>, ApiError> {
    let task_id = parse_task_id(&raw)?;
    evaluator(&state)?
        .registry()
        .snapshot(task_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::unknown_task(task_id))
}

#[derive(Debug, Deserialize)]
struct UpdatesQuery {
    #[serde(default)]
    after: u64,
}

async fn task_updates(
    State(state): Shared,
    Path(raw): Path<String>,
    Query(query): Query<UpdatesQuery>,
) -> Result<Json<Vec<StatusUpdate>>, ApiError> {
    let task_id = parse_task_id(&raw)?;
    evaluator(&state)?
        .registry()
        .updates_after(task_id, query.after)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::unknown_task(task_id))
}

async fn completed_result(
    state: &HostState,
    task_id: TaskId,
) -> Result<AssessmentResult, ApiError> {
    match evaluator(state)?.registry().result(task_id).await {
        Some(ResultLookup::Ready(result)) => Ok(result),
        Some(ResultLookup::Failed(failure)) => Err(ApiError::task_failed(task_id, failure)),
        Some(ResultLookup::Pending(status)) => Err(ApiError::not_ready(task_id, status)),
        None => Err(ApiError::unknown_task(task_id)),
    }
}

async fn task_result(
    State(state): Shared,
    Path(raw): Path<String>,
) -> Result<Json<AssessmentResult>, ApiError> {
    let task_id = parse_task_id(&raw)?;
    completed_result(&state, task_id).await.map(Json)
}

async fn task_artifact(
    State(state): Shared,
    Path((raw, name)): Path<(String, String)>,
) -> Result<Json<Artifact>, ApiError> {
    let task_id = parse_task_id(&raw)?;
    let result = completed_result(&state, task_id).await?;
    result.artifact(&name).cloned().map(Json).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "unknown_artifact",
            format!("task {task_id} has no artifact '{name}'"),
        )
    })
}

async fn cancel_task(
    State(state): Shared,
    Path(raw): Path<String>,
) -> Result<Json<CancelAck>, ApiError> {
    let task_id = parse_task_id(&raw)?;
    let cancelled = evaluator(&state)?
        .registry()
        .cancel(task_id)
        .await
        .ok_or_else(|| ApiError::unknown_task(task_id))?;
    if cancelled {
        tracing::info!(task_id = %task_id, "cancellation requested");
    }
    Ok(Json(CancelAck { task_id, cancelled }))
}

async fn message(
    State(state): Shared,
    body: Result<Json<ParticipantMessage>, JsonRejection>,
) -> Result<Json<ParticipantReply>, ApiError> {
    let participant = state.participant.as_ref().ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "not_a_participant",
            format!("agent '{}' does not accept messages", state.card.name),
        )
    })?;
    let Json(message) = body.map_err(|e| {
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_message", e.body_text())
    })?;
    message.validate().map_err(|e| {
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_message", e.to_string())
    })?;

    match participant.respond(&message).await {
        Ok(payload) => Ok(Json(ParticipantReply {
            task_id: message.task_id,
            payload,
        })),
        Err(e) => Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "participant_error",
            format!("{e:#}"),
        )),
    }
}

//! Request/response façade for one agent endpoint.

use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::contract::{
    AgentCard, Artifact, AssessmentResult, CancelAck, Endpoint, ErrorBody, HealthReport,
    ParticipantMessage, ParticipantReply, StatusUpdate, SubmitAck, TaskId, TaskSnapshot,
    TaskStatus, TaskSubmission,
};

use super::error::{ClientError, ClientResult};
use super::retry::{with_retry, RetryPolicy};
use super::stream::{poll_updates, UpdateStream};

/// Timeouts and retry budget applied to every call.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Budget for one HTTP request/response exchange.
    pub request_timeout: Duration,
    /// Delay between polls while streaming updates.
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    /// Buffered updates between the poller and the consumer.
    pub stream_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            retry: RetryPolicy::default(),
            stream_capacity: 32,
        }
    }
}

/// Agent client. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl AgentClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Setup(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A clone with a different per-request timeout.
    pub fn with_request_timeout(&self, timeout: Duration) -> Self {
        let mut config = self.config.clone();
        config.request_timeout = timeout;
        Self {
            http: self.http.clone(),
            config,
        }
    }

    /// One side-effect-free health probe. Never retried; any failure is
    /// "not ready".
    pub async fn probe_health(&self, endpoint: &Endpoint, path: &str) -> bool {
        let resp = match self.send_once(endpoint, Method::GET, path, None::<&()>).await {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return false,
        };
        match resp.bytes().await {
            Ok(body) if body.is_empty() => true,
            Ok(body) => serde_json::from_slice::<HealthReport>(&body)
                .map(|h| h.ready)
                .unwrap_or(true),
            Err(_) => false,
        }
    }

    pub async fn get_card(&self, endpoint: &Endpoint) -> ClientResult<AgentCard> {
        let resp = self.send(endpoint, Method::GET, "/card", None::<&()>).await?;
        decode(endpoint, resp).await
    }

    /// Create a task on the evaluator. Returns the acknowledged task id.
    pub async fn submit_task(
        &self,
        endpoint: &Endpoint,
        submission: &TaskSubmission,
    ) -> ClientResult<TaskId> {
        submission.validate()?;
        let resp = self
            .send(endpoint, Method::POST, "/tasks", Some(submission))
            .await?;
        let ack: SubmitAck = decode(endpoint, resp).await?;
        if ack.task_id != submission.task_id {
            return Err(ClientError::protocol(
                endpoint,
                format!(
                    "acknowledged task {} instead of {}",
                    ack.task_id, submission.task_id
                ),
            ));
        }
        Ok(ack.task_id)
    }

    /// Evaluator → participant exchange.
    pub async fn send_message(
        &self,
        endpoint: &Endpoint,
        message: &ParticipantMessage,
    ) -> ClientResult<ParticipantReply> {
        message.validate()?;
        let resp = self
            .send(endpoint, Method::POST, "/message", Some(message))
            .await?;
        let reply: ParticipantReply = decode(endpoint, resp).await?;
        if reply.task_id != message.task_id {
            return Err(ClientError::protocol(
                endpoint,
                format!("reply for task {} to message for {}", reply.task_id, message.task_id),
            ));
        }
        Ok(reply)
    }

    pub async fn task_snapshot(
        &self,
        endpoint: &Endpoint,
        task_id: TaskId,
    ) -> ClientResult<TaskSnapshot> {
        let path = format!("/tasks/{task_id}");
        let resp = self.send(endpoint, Method::GET, &path, None::<&()>).await?;
        decode(endpoint, resp).await
    }

    /// Updates with `seq > after`, in emission order.
    pub async fn updates_since(
        &self,
        endpoint: &Endpoint,
        task_id: TaskId,
        after: u64,
    ) -> ClientResult<Vec<StatusUpdate>> {
        let path = format!("/tasks/{task_id}/updates?after={after}");
        let resp = self.send(endpoint, Method::GET, &path, None::<&()>).await?;
        let updates: Vec<StatusUpdate> = decode(endpoint, resp).await?;
        for update in &updates {
            if update.task_id != task_id {
                return Err(ClientError::protocol(
                    endpoint,
                    format!("update for task {} in stream of {task_id}", update.task_id),
                ));
            }
            update
                .validate()
                .map_err(|e| ClientError::protocol(endpoint, e.to_string()))?;
        }
        Ok(updates)
    }

    /// Lazily stream updates until the terminal one.
    ///
    /// Fails with [`ClientError::Timeout`] once `budget` elapses. Dropping the
    /// stream stops watching without touching the remote task.
    pub fn stream_updates(
        &self,
        endpoint: &Endpoint,
        task_id: TaskId,
        budget: Duration,
    ) -> UpdateStream {
        let (tx, rx) = mpsc::channel(self.config.stream_capacity.max(1));
        let poller = tokio::spawn(poll_updates(
            self.clone(),
            endpoint.clone(),
            task_id,
            budget,
            tx,
        ));
        UpdateStream::new(rx, poller)
    }

    /// The final result of a completed task.
    ///
    /// [`ClientError::NotReady`] before a terminal status,
    /// [`ClientError::TaskFailed`] when the task ended in FAILED.
    pub async fn fetch_result(
        &self,
        endpoint: &Endpoint,
        task_id: TaskId,
    ) -> ClientResult<AssessmentResult> {
        let path = format!("/tasks/{task_id}/result");
        let resp = self.send(endpoint, Method::GET, &path, None::<&()>).await?;
        let result: AssessmentResult = decode_task_resource(endpoint, task_id, resp).await?;
        if result.task_id != task_id {
            return Err(ClientError::protocol(
                endpoint,
                format!("result for task {} returned for {task_id}", result.task_id),
            ));
        }
        result
            .validate()
            .map_err(|e| ClientError::protocol(endpoint, e.to_string()))?;
        Ok(result)
    }

    pub async fn fetch_artifact(
        &self,
        endpoint: &Endpoint,
        task_id: TaskId,
        name: &str,
    ) -> ClientResult<Artifact> {
        let path = format!("/tasks/{task_id}/artifacts/{name}");
        let resp = self.send(endpoint, Method::GET, &path, None::<&()>).await?;
        let artifact: Artifact = decode_task_resource(endpoint, task_id, resp).await?;
        artifact
            .validate()
            .map_err(|e| ClientError::protocol(endpoint, e.to_string()))?;
        Ok(artifact)
    }

    /// Request cooperative cancellation. `Ok(false)` if already terminal.
    pub async fn cancel_task(&self, endpoint: &Endpoint, task_id: TaskId) -> ClientResult<bool> {
        let path = format!("/tasks/{task_id}/cancel");
        let resp = self.send(endpoint, Method::POST, &path, None::<&()>).await?;
        let ack: CancelAck = decode(endpoint, resp).await?;
        Ok(ack.cancelled)
    }

    /// Ask the agent process to exit. Single attempt.
    pub async fn request_shutdown(&self, endpoint: &Endpoint) -> ClientResult<()> {
        let resp = self
            .send_once(endpoint, Method::POST, "/shutdown", None::<&()>)
            .await?;
        if !resp.status().is_success() {
            return Err(rejected(endpoint, resp).await);
        }
        Ok(())
    }

    async fn send<B>(
        &self,
        endpoint: &Endpoint,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ClientResult<Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        with_retry(&self.config.retry, move || {
            let method = method.clone();
            async move { self.send_once(endpoint, method, path, body).await }
        })
        .await
    }

    async fn send_once<B>(
        &self,
        endpoint: &Endpoint,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ClientResult<Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = endpoint.join(path);
        let mut request = self
            .http
            .request(method, &url)
            .timeout(self.config.request_timeout);
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| self.classify(endpoint, path, e))?;
        if resp.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Err(ClientError::Unreachable {
                endpoint: endpoint.to_string(),
                attempts: 1,
                reason: "503 service unavailable".to_string(),
            });
        }
        Ok(resp)
    }

    fn classify(&self, endpoint: &Endpoint, path: &str, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout {
                operation: format!("request {path} on {endpoint}"),
                elapsed_ms: self.config.request_timeout.as_millis() as u64,
            }
        } else if err.is_connect() || err.is_request() {
            ClientError::Unreachable {
                endpoint: endpoint.to_string(),
                attempts: 1,
                reason: err.to_string(),
            }
        } else {
            ClientError::protocol(endpoint, err.to_string())
        }
    }
}

async fn decode<T: DeserializeOwned>(endpoint: &Endpoint, resp: Response) -> ClientResult<T> {
    if !resp.status().is_success() {
        return Err(rejected(endpoint, resp).await);
    }
    let body = resp
        .bytes()
        .await
        .map_err(|e| ClientError::protocol(endpoint, format!("reading body: {e}")))?;
    serde_json::from_slice(&body)
        .map_err(|e| ClientError::protocol(endpoint, format!("undecodable body: {e}")))
}

/// Decode a resource that only exists once the task completed.
async fn decode_task_resource<T: DeserializeOwned>(
    endpoint: &Endpoint,
    task_id: TaskId,
    resp: Response,
) -> ClientResult<T> {
    match resp.status() {
        StatusCode::CONFLICT => {
            let body = error_body(resp).await;
            Err(ClientError::NotReady {
                task_id,
                status: body
                    .and_then(|b| b.status)
                    .unwrap_or(TaskStatus::Running),
            })
        }
        StatusCode::UNPROCESSABLE_ENTITY => match error_body(resp).await.and_then(|b| b.failure) {
            Some(failure) => Err(ClientError::TaskFailed { task_id, failure }),
            None => Err(ClientError::protocol(
                endpoint,
                "failed task reported without a failure description",
            )),
        },
        _ => decode(endpoint, resp).await,
    }
}

async fn error_body(resp: Response) -> Option<ErrorBody> {
    let bytes = resp.bytes().await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

async fn rejected(endpoint: &Endpoint, resp: Response) -> ClientError {
    let status = resp.status();
    let reason = match error_body(resp).await {
        Some(body) => format!("HTTP {status} {}: {}", body.error, body.message),
        None => format!("HTTP {status}"),
    };
    ClientError::protocol(endpoint, reason)
}

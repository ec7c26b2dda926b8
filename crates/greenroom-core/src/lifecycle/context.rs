//! The fixed context handed to every benchmark hook.

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::client::{AgentClient, ClientError};
use crate::contract::{AssessmentConfig, Participant, ParticipantMessage, TaskId, TaskSubmission};

use super::cancel::{CancelSignal, Cancelled};

/// Everything a hook may use: task identity, participants, configuration,
/// the client for participant calls, and the cancellation signal.
#[derive(Debug, Clone)]
pub struct AssessmentContext {
    task_id: TaskId,
    evaluator_role: String,
    participants: Vec<Participant>,
    config: AssessmentConfig,
    client: AgentClient,
    cancel: CancelSignal,
}

impl AssessmentContext {
    pub fn new(submission: &TaskSubmission, client: AgentClient, cancel: CancelSignal) -> Self {
        Self {
            task_id: submission.task_id,
            evaluator_role: submission.role.clone(),
            participants: submission.participants.clone(),
            config: submission.config.clone(),
            client,
            cancel,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn evaluator_role(&self) -> &str {
        &self.evaluator_role
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, role: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.role == role)
    }

    pub fn config(&self) -> &AssessmentConfig {
        &self.config
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(Value::as_u64)
    }

    pub fn client(&self) -> &AgentClient {
        &self.client
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn ensure_active(&self) -> Result<(), Cancelled> {
        self.cancel.check()
    }

    /// Send `payload` to the participant playing `role`; returns its reply
    /// payload. Aborts early with [`Cancelled`] if cancellation arrives first.
    pub async fn send_to(&self, role: &str, payload: Value) -> Result<Value> {
        self.exchange(&self.client, role, payload).await
    }

    /// Like [`send_to`](Self::send_to) with an explicit budget; exceeding it
    /// fails with [`ClientError::Timeout`].
    pub async fn send_to_with_timeout(
        &self,
        role: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let client = self.client.with_request_timeout(timeout);
        match tokio::time::timeout(timeout, self.exchange(&client, role, payload)).await {
            Ok(reply) => reply,
            Err(_) => Err(ClientError::Timeout {
                operation: format!("message to participant '{role}'"),
                elapsed_ms: timeout.as_millis() as u64,
            }
            .into()),
        }
    }

    async fn exchange(&self, client: &AgentClient, role: &str, payload: Value) -> Result<Value> {
        self.ensure_active()?;
        let participant = self
            .participant(role)
            .ok_or_else(|| anyhow!("unknown participant role '{role}'"))?;
        let message = ParticipantMessage {
            task_id: self.task_id,
            sender: self.evaluator_role.clone(),
            payload,
        };
        tokio::select! {
            reply = client.send_message(&participant.endpoint, &message) => Ok(reply?.payload),
            _ = self.cancel.cancelled() => Err(Cancelled.into()),
        }
    }
}

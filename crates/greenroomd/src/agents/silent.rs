use async_trait::async_trait;
use greenroom_core::{ParticipantAgent, ParticipantMessage};
use serde_json::Value;

/// Participant that holds every request open forever.
pub struct Silent;

#[async_trait]
impl ParticipantAgent for Silent {
    async fn respond(&self, message: &ParticipantMessage) -> anyhow::Result<Value> {
        tracing::debug!(task_id = %message.task_id, "ignoring message");
        std::future::pending().await
    }
}

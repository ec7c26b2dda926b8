use async_trait::async_trait;
use greenroom_core::{ParticipantAgent, ParticipantMessage};
use serde_json::Value;

/// Participant that answers with the payload it was sent.
pub struct Echo;

#[async_trait]
impl ParticipantAgent for Echo {
    async fn respond(&self, message: &ParticipantMessage) -> anyhow::Result<Value> {
        tracing::debug!(task_id = %message.task_id, sender = %message.sender, "echoing");
        Ok(message.payload.clone())
    }
}

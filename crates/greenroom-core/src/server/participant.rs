use async_trait::async_trait;
use serde_json::Value;

use crate::contract::ParticipantMessage;

/// A participant agent: answers one evaluator message with one payload.
#[async_trait]
pub trait ParticipantAgent: Send + Sync {
    async fn respond(&self, message: &ParticipantMessage) -> anyhow::Result<Value>;
}

//! The interface a concrete benchmark implements, and the checkpoint channel
//! its run hook reports progress through.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::contract::{AssessmentResult, StatusUpdate};

use super::cancel::{CancelSignal, Cancelled};
use super::context::AssessmentContext;

/// Three-phase benchmark driven by the [`GreenExecutor`](super::GreenExecutor).
///
/// Hooks run strictly in order: `setup` before any participant interaction,
/// `run` as the only phase talking to participants, `evaluate` as the only
/// phase producing a score. An `Err` from any hook fails the task with no
/// result.
#[async_trait]
pub trait Benchmark: Send + Sync {
    fn name(&self) -> &str;

    async fn setup(&self, ctx: &AssessmentContext) -> anyhow::Result<()>;

    /// Exchange messages with participants. The returned value is handed to
    /// `evaluate` together with every checkpoint emitted.
    async fn run(&self, ctx: &AssessmentContext, checkpoints: &Checkpoints)
        -> anyhow::Result<Value>;

    async fn evaluate(
        &self,
        ctx: &AssessmentContext,
        collected: Collected,
    ) -> anyhow::Result<AssessmentResult>;
}

/// A progress report from the run hook; becomes a `running` status update.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub message: String,
    pub progress: Option<f32>,
    pub payload: Option<Value>,
}

impl Checkpoint {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            progress: None,
            payload: None,
        }
    }

    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Sender half of the bounded checkpoint channel.
///
/// Every emit observes cancellation first; a full channel applies
/// backpressure to the run hook.
pub struct Checkpoints {
    tx: mpsc::Sender<Checkpoint>,
    cancel: CancelSignal,
}

impl Checkpoints {
    pub(crate) fn new(tx: mpsc::Sender<Checkpoint>, cancel: CancelSignal) -> Self {
        Self { tx, cancel }
    }

    pub async fn emit(&self, message: impl Into<String>) -> Result<(), Cancelled> {
        self.emit_with(Checkpoint::new(message)).await
    }

    pub async fn emit_with(&self, checkpoint: Checkpoint) -> Result<(), Cancelled> {
        self.cancel.check()?;
        self.tx.send(checkpoint).await.map_err(|_| Cancelled)
    }
}

/// Data collected during `run`, consumed by `evaluate`.
#[derive(Debug, Clone)]
pub struct Collected {
    /// Recorded checkpoint updates, in emission order.
    pub checkpoints: Vec<StatusUpdate>,
    /// Value returned by the run hook.
    pub output: Value,
}

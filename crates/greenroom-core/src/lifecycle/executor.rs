//! The green executor: drives one benchmark through setup → run → evaluate.
//!
//! The executor owns phase sequencing, cancellation at phase boundaries and
//! translation of hook errors into a [`LifecycleFailure`]. The benchmark only
//! fills in the three hooks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::client::{AgentClient, ClientError};
use crate::contract::{
    AssessmentResult, FailureReason, Hook, LifecycleFailure, StatusUpdate, TaskId, TaskStatus,
    TaskSubmission,
};
use crate::metrics::METRICS;
use crate::obs;

use super::benchmark::{Benchmark, Checkpoint, Checkpoints, Collected};
use super::cancel::{CancelSignal, Cancelled};
use super::context::AssessmentContext;
use super::error::LifecycleResult;
use super::registry::TaskRegistry;

/// Default capacity of the run hook's checkpoint channel.
pub const DEFAULT_CHECKPOINT_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct GreenExecutor {
    benchmark: Arc<dyn Benchmark>,
    registry: TaskRegistry,
    client: AgentClient,
    checkpoint_capacity: usize,
}

impl GreenExecutor {
    pub fn new(benchmark: Arc<dyn Benchmark>, client: AgentClient) -> Self {
        Self {
            benchmark,
            registry: TaskRegistry::new(),
            client,
            checkpoint_capacity: DEFAULT_CHECKPOINT_CAPACITY,
        }
    }

    pub fn with_checkpoint_capacity(mut self, capacity: usize) -> Self {
        self.checkpoint_capacity = capacity.max(1);
        self
    }

    /// Keep finished tasks readable for `retention`. Call before serving.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.registry = TaskRegistry::with_retention(retention);
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn benchmark_name(&self) -> &str {
        self.benchmark.name()
    }

    /// Register the task and start driving it in the background.
    ///
    /// Fails synchronously only for an invalid envelope or a duplicate id;
    /// every later problem ends the task in FAILED.
    pub async fn submit(&self, submission: TaskSubmission) -> LifecycleResult<JoinHandle<()>> {
        submission.validate()?;
        let cancel = self.registry.register(submission.task_id).await?;
        let span = obs::assessment_span(submission.task_id, self.benchmark.name());
        let this = self.clone();
        Ok(tokio::spawn(
            async move { this.execute(submission, cancel).await }.instrument(span),
        ))
    }

    async fn execute(&self, submission: TaskSubmission, cancel: CancelSignal) {
        let task_id = submission.task_id;
        let started = Instant::now();
        METRICS.inc_assessments_started();
        obs::emit_assessment_started(task_id, self.benchmark.name(), submission.participants.len());

        let ctx = AssessmentContext::new(&submission, self.client.clone(), cancel);
        let outcome = self.drive(&ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                let (score, passed) = (result.score, result.passed);
                match self.registry.complete(task_id, result).await {
                    Ok(_) => {
                        METRICS.inc_assessments_completed();
                        obs::emit_assessment_finished(task_id, score, passed, duration_ms);
                    }
                    Err(e) => {
                        let failure =
                            LifecycleFailure::new(Hook::Evaluate, FailureReason::Error, e.to_string());
                        self.fail(task_id, failure, duration_ms).await;
                    }
                }
            }
            Err(failure) => self.fail(task_id, failure, duration_ms).await,
        }
    }

    async fn drive(&self, ctx: &AssessmentContext) -> Result<AssessmentResult, LifecycleFailure> {
        self.enter(ctx, TaskStatus::Setup, "setup started").await?;
        self.benchmark
            .setup(ctx)
            .await
            .map_err(|e| classify(Hook::Setup, e))?;

        self.enter(ctx, TaskStatus::Running, "run started").await?;
        let collected = self.run_phase(ctx).await?;

        self.enter(ctx, TaskStatus::Evaluating, "evaluation started")
            .await?;
        let result = self
            .benchmark
            .evaluate(ctx, collected)
            .await
            .map_err(|e| classify(Hook::Evaluate, e))?;

        if result.task_id != ctx.task_id() {
            return Err(LifecycleFailure::new(
                Hook::Evaluate,
                FailureReason::Error,
                format!("result belongs to task {}", result.task_id),
            ));
        }
        result.validate().map_err(|e| {
            LifecycleFailure::new(Hook::Evaluate, FailureReason::Error, e.to_string())
        })?;
        if ctx.is_cancelled() {
            return Err(LifecycleFailure::cancelled(Hook::Evaluate));
        }
        Ok(result)
    }

    /// Phase boundary: observe cancellation, then record the phase update.
    async fn enter(
        &self,
        ctx: &AssessmentContext,
        status: TaskStatus,
        message: &str,
    ) -> Result<(), LifecycleFailure> {
        let hook = Hook::for_status(status);
        if ctx.is_cancelled() {
            return Err(LifecycleFailure::cancelled(hook));
        }
        self.registry
            .record(ctx.task_id(), status, Checkpoint::new(message))
            .await
            .map_err(|e| LifecycleFailure::new(hook, FailureReason::Error, e.to_string()))?;
        obs::emit_phase_entered(ctx.task_id(), status);
        Ok(())
    }

    /// Run the hook while draining its checkpoints into the registry.
    async fn run_phase(&self, ctx: &AssessmentContext) -> Result<Collected, LifecycleFailure> {
        let (tx, mut rx) = mpsc::channel(self.checkpoint_capacity);
        let checkpoints = Checkpoints::new(tx, ctx.cancel_signal().clone());
        let mut recorded = Vec::new();

        let run = self.benchmark.run(ctx, &checkpoints);
        tokio::pin!(run);
        let output = loop {
            tokio::select! {
                biased;
                Some(checkpoint) = rx.recv() => {
                    recorded.push(self.record_checkpoint(ctx.task_id(), checkpoint).await?);
                }
                output = &mut run => break output,
            }
        };
        while let Ok(checkpoint) = rx.try_recv() {
            recorded.push(self.record_checkpoint(ctx.task_id(), checkpoint).await?);
        }

        let output = output.map_err(|e| classify(Hook::Run, e))?;
        Ok(Collected {
            checkpoints: recorded,
            output,
        })
    }

    async fn record_checkpoint(
        &self,
        task_id: TaskId,
        checkpoint: Checkpoint,
    ) -> Result<StatusUpdate, LifecycleFailure> {
        self.registry
            .record(task_id, TaskStatus::Running, checkpoint)
            .await
            .map_err(|e| LifecycleFailure::new(Hook::Run, FailureReason::Error, e.to_string()))
    }

    async fn fail(&self, task_id: TaskId, failure: LifecycleFailure, duration_ms: u64) {
        if let Err(e) = self.registry.fail(task_id, failure.clone()).await {
            tracing::error!(task_id = %task_id, error = %e, "could not record task failure");
        }
        METRICS.inc_assessments_failed();
        obs::emit_assessment_failed(task_id, &failure, duration_ms);
    }
}

/// Translate a hook error into the failure recorded on the task.
pub fn classify(hook: Hook, err: anyhow::Error) -> LifecycleFailure {
    if err.chain().any(|cause| cause.is::<Cancelled>()) {
        return LifecycleFailure::cancelled(hook);
    }
    let timed_out = err.chain().any(|cause| {
        cause
            .downcast_ref::<ClientError>()
            .is_some_and(ClientError::is_timeout)
    });
    let reason = if timed_out {
        FailureReason::Timeout
    } else {
        FailureReason::Error
    };
    LifecycleFailure::new(hook, reason, format!("{err:#}"))
}

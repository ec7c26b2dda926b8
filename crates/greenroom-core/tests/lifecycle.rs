//! Evaluator lifecycle driven over HTTP against in-process agent hosts.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde_json::{json, Value};

use greenroom_core::contract::{FailureReason, Hook};
use greenroom_core::lifecycle::Cancelled;
use greenroom_core::{
    AgentCard, AgentClient, AgentHost, Artifact, AssessmentContext, AssessmentResult, Benchmark,
    Checkpoint, Checkpoints, ClientConfig, ClientError, Collected, GreenExecutor, Participant,
    ParticipantAgent, ParticipantMessage, RetryPolicy, RunningHost, StatusUpdate, TaskId,
    TaskStatus, TaskSubmission,
};

// -------------------------------------------------------------------------
// Fixtures
// -------------------------------------------------------------------------

#[derive(Default)]
struct Scripted {
    fail_in: Option<Hook>,
    /// Park the run hook until cancellation.
    block_run: bool,
    checkpoints: usize,
}

#[async_trait]
impl Benchmark for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn setup(&self, _ctx: &AssessmentContext) -> anyhow::Result<()> {
        if self.fail_in == Some(Hook::Setup) {
            bail!("setup exploded");
        }
        Ok(())
    }

    async fn run(&self, ctx: &AssessmentContext, checkpoints: &Checkpoints) -> anyhow::Result<Value> {
        for i in 0..self.checkpoints {
            let progress = (i + 1) as f32 / self.checkpoints as f32;
            checkpoints
                .emit_with(Checkpoint::new(format!("turn {i}")).with_progress(progress))
                .await?;
        }
        if self.block_run {
            ctx.cancel_signal().cancelled().await;
            return Err(Cancelled.into());
        }
        if self.fail_in == Some(Hook::Run) {
            bail!("run exploded");
        }
        let input = ctx.config().get("input").cloned().unwrap_or(Value::Null);
        ctx.send_to("participant", input).await
    }

    async fn evaluate(&self, ctx: &AssessmentContext, collected: Collected) -> anyhow::Result<AssessmentResult> {
        if self.fail_in == Some(Hook::Evaluate) {
            bail!("evaluate exploded");
        }
        let input = ctx.config().get("input").ok_or_else(|| anyhow!("no input"))?;
        let matched = &collected.output == input;
        Ok(AssessmentResult::new(ctx.task_id(), if matched { 1.0 } else { 0.0 }, matched)
            .with_detail("checkpoints", json!(collected.checkpoints.len()))
            .with_artifact(Artifact::text("log.txt", "text/plain", "one turn")))
    }
}

struct Echo;

#[async_trait]
impl ParticipantAgent for Echo {
    async fn respond(&self, message: &ParticipantMessage) -> anyhow::Result<Value> {
        Ok(message.payload.clone())
    }
}

fn card(name: &str) -> AgentCard {
    AgentCard {
        name: name.to_string(),
        description: "test agent".to_string(),
        version: "0.0.0".to_string(),
        roles: Vec::new(),
        capabilities: Vec::new(),
    }
}

fn client() -> AgentClient {
    AgentClient::new(ClientConfig {
        request_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
        ..ClientConfig::default()
    })
    .unwrap()
}

async fn spawn(host: AgentHost) -> RunningHost {
    host.bind("127.0.0.1:0".parse().unwrap()).await.unwrap().spawn()
}

struct Harness {
    evaluator: RunningHost,
    participant: RunningHost,
    client: AgentClient,
}

impl Harness {
    async fn start(benchmark: Scripted) -> Self {
        let executor = GreenExecutor::new(Arc::new(benchmark), client());
        Self {
            evaluator: spawn(AgentHost::new(card("evaluator")).with_evaluator(executor)).await,
            participant: spawn(AgentHost::new(card("echo")).with_participant(Arc::new(Echo))).await,
            client: client(),
        }
    }

    fn submission(&self) -> TaskSubmission {
        let mut config = serde_json::Map::new();
        config.insert("input".into(), json!("5"));
        TaskSubmission {
            task_id: TaskId::new(),
            role: "evaluator".into(),
            participants: vec![Participant {
                role: "participant".into(),
                endpoint: self.participant.endpoint().clone(),
            }],
            config,
        }
    }

    async fn submit(&self) -> TaskId {
        let submission = self.submission();
        self.client
            .submit_task(self.evaluator.endpoint(), &submission)
            .await
            .unwrap()
    }

    async fn drain(&self, task_id: TaskId) -> Vec<StatusUpdate> {
        let mut stream = self
            .client
            .stream_updates(self.evaluator.endpoint(), task_id, Duration::from_secs(10));
        let mut updates = Vec::new();
        while let Some(update) = stream.next().await {
            updates.push(update.unwrap());
        }
        updates
    }

    async fn wait_for(&self, task_id: TaskId, status: TaskStatus) {
        for _ in 0..200 {
            let snapshot = self
                .client
                .task_snapshot(self.evaluator.endpoint(), task_id)
                .await
                .unwrap();
            if snapshot.status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} never reached {status}");
    }

    async fn stop(self) {
        self.evaluator.stop().await.unwrap();
        self.participant.stop().await.unwrap();
    }
}

fn rank(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Created => 0,
        TaskStatus::Setup => 1,
        TaskStatus::Running => 2,
        TaskStatus::Evaluating => 3,
        TaskStatus::Completed | TaskStatus::Failed => 4,
    }
}

fn assert_well_ordered(updates: &[StatusUpdate]) {
    assert!(!updates.is_empty());
    for (i, update) in updates.iter().enumerate() {
        assert_eq!(update.seq, i as u64 + 1);
    }
    for pair in updates.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
        assert!(rank(pair[0].status) <= rank(pair[1].status));
    }
    let terminal = updates.iter().filter(|u| u.is_terminal()).count();
    assert_eq!(terminal, 1);
    assert!(updates.last().unwrap().is_terminal());
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_happy_path_statuses_and_idempotent_result() {
    let harness = Harness::start(Scripted {
        checkpoints: 3,
        ..Scripted::default()
    })
    .await;
    let task_id = harness.submit().await;
    let updates = harness.drain(task_id).await;

    assert_well_ordered(&updates);
    let statuses: Vec<TaskStatus> = updates.iter().map(|u| u.status).collect();
    assert_eq!(
        statuses,
        vec![
            TaskStatus::Created,
            TaskStatus::Setup,
            TaskStatus::Running,
            TaskStatus::Running,
            TaskStatus::Running,
            TaskStatus::Running,
            TaskStatus::Evaluating,
            TaskStatus::Completed,
        ]
    );

    let endpoint = harness.evaluator.endpoint();
    let first = harness.client.fetch_result(endpoint, task_id).await.unwrap();
    let second = harness.client.fetch_result(endpoint, task_id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
    assert_eq!(first.score, 1.0);
    assert!(first.passed);
    assert_eq!(first.details["checkpoints"], json!(3));

    let artifact = harness
        .client
        .fetch_artifact(endpoint, task_id, "log.txt")
        .await
        .unwrap();
    assert_eq!(artifact.media_type, "text/plain");

    harness.stop().await;
}

#[tokio::test]
async fn test_hook_error_fails_task_without_result() {
    for hook in [Hook::Setup, Hook::Run, Hook::Evaluate] {
        let harness = Harness::start(Scripted {
            fail_in: Some(hook),
            ..Scripted::default()
        })
        .await;
        let task_id = harness.submit().await;
        let updates = harness.drain(task_id).await;

        assert_well_ordered(&updates);
        let last = updates.last().unwrap();
        assert_eq!(last.status, TaskStatus::Failed);
        assert!(!updates.iter().any(|u| u.status == TaskStatus::Completed));
        let failure = last.failure().unwrap();
        assert_eq!(failure.hook, hook);
        assert_eq!(failure.reason, FailureReason::Error);

        match harness
            .client
            .fetch_result(harness.evaluator.endpoint(), task_id)
            .await
        {
            Err(ClientError::TaskFailed { failure, .. }) => assert_eq!(failure.hook, hook),
            other => panic!("expected TaskFailed for {hook}, got {other:?}"),
        }
        harness.stop().await;
    }
}

#[tokio::test]
async fn test_result_not_ready_while_running() {
    let harness = Harness::start(Scripted {
        block_run: true,
        ..Scripted::default()
    })
    .await;
    let task_id = harness.submit().await;
    harness.wait_for(task_id, TaskStatus::Running).await;

    let endpoint = harness.evaluator.endpoint();
    match harness.client.fetch_result(endpoint, task_id).await {
        Err(ClientError::NotReady { status, .. }) => assert_eq!(status, TaskStatus::Running),
        other => panic!("expected NotReady, got {other:?}"),
    }
    assert!(harness.client.cancel_task(endpoint, task_id).await.unwrap());
    harness.stop().await;
}

#[tokio::test]
async fn test_cancellation_fails_task_as_cancelled() {
    let harness = Harness::start(Scripted {
        block_run: true,
        ..Scripted::default()
    })
    .await;
    let task_id = harness.submit().await;
    harness.wait_for(task_id, TaskStatus::Running).await;

    let endpoint = harness.evaluator.endpoint();
    assert!(harness.client.cancel_task(endpoint, task_id).await.unwrap());
    let updates = harness.drain(task_id).await;
    assert_well_ordered(&updates);

    let failure = updates.last().unwrap().failure().unwrap();
    assert_eq!(failure.reason, FailureReason::Cancelled);
    assert_eq!(failure.hook, Hook::Run);

    // Already terminal.
    assert!(!harness.client.cancel_task(endpoint, task_id).await.unwrap());
    let snapshot = harness.client.task_snapshot(endpoint, task_id).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert!(snapshot.failure.is_some());
    harness.stop().await;
}

#[tokio::test]
async fn test_duplicate_task_id_rejected() {
    let harness = Harness::start(Scripted::default()).await;
    let submission = harness.submission();
    let endpoint = harness.evaluator.endpoint();

    harness.client.submit_task(endpoint, &submission).await.unwrap();
    let err = harness
        .client
        .submit_task(endpoint, &submission)
        .await
        .unwrap_err();
    assert!(!err.is_transient(), "{err}");
    assert!(err.to_string().contains("duplicate_task"), "{err}");

    harness.drain(submission.task_id).await;
    harness.stop().await;
}

#[tokio::test]
async fn test_stream_times_out_instead_of_truncating() {
    let harness = Harness::start(Scripted {
        block_run: true,
        ..Scripted::default()
    })
    .await;
    let task_id = harness.submit().await;
    let endpoint = harness.evaluator.endpoint();

    let mut stream = harness
        .client
        .stream_updates(endpoint, task_id, Duration::from_millis(300));
    let mut seen = Vec::new();
    let mut timed_out = false;
    while let Some(item) = stream.next().await {
        match item {
            Ok(update) => seen.push(update.status),
            Err(e) => {
                assert!(e.is_timeout(), "{e}");
                timed_out = true;
            }
        }
    }
    assert!(timed_out);
    assert!(seen.contains(&TaskStatus::Running));
    assert!(!seen.iter().any(|s| s.is_terminal()));

    harness.client.cancel_task(endpoint, task_id).await.unwrap();
    harness.stop().await;
}

//! Reference evaluator: one turn, scored by exact match.
//!
//! Configuration keys:
//!
//! | key | meaning |
//! |-----|---------|
//! | `input` | payload sent to the participant (required) |
//! | `expected` | reply that scores 1.0 (default: `input`) |
//! | `participant_role` | who to ask (default: first participant) |
//! | `participant_timeout_ms` | budget for the reply |

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use greenroom_core::{
    Artifact, AssessmentContext, AssessmentResult, Benchmark, Checkpoint, Checkpoints, Collected,
};
use serde_json::{json, Value};

pub const TRANSCRIPT_ARTIFACT: &str = "transcript.json";

pub struct ExactMatch;

fn input(ctx: &AssessmentContext) -> Result<&Value> {
    ctx.config()
        .get("input")
        .ok_or_else(|| anyhow!("config.input is required"))
}

fn participant_role(ctx: &AssessmentContext) -> Result<String> {
    match ctx.config_str("participant_role") {
        Some(role) => {
            if ctx.participant(role).is_none() {
                bail!("config.participant_role '{role}' is not a participant of this task");
            }
            Ok(role.to_string())
        }
        None => ctx
            .participants()
            .first()
            .map(|p| p.role.clone())
            .ok_or_else(|| anyhow!("no participant to assess")),
    }
}

#[async_trait]
impl Benchmark for ExactMatch {
    fn name(&self) -> &str {
        "exact-match"
    }

    async fn setup(&self, ctx: &AssessmentContext) -> Result<()> {
        input(ctx)?;
        let role = participant_role(ctx)?;
        tracing::debug!(task_id = %ctx.task_id(), participant = %role, "exact-match ready");
        Ok(())
    }

    async fn run(&self, ctx: &AssessmentContext, checkpoints: &Checkpoints) -> Result<Value> {
        let input = input(ctx)?.clone();
        let role = participant_role(ctx)?;

        checkpoints
            .emit_with(Checkpoint::new(format!("asking {role}")).with_progress(0.0))
            .await?;
        let reply = match ctx.config_u64("participant_timeout_ms") {
            Some(ms) => {
                ctx.send_to_with_timeout(&role, input.clone(), Duration::from_millis(ms))
                    .await
            }
            None => ctx.send_to(&role, input.clone()).await,
        }
        .with_context(|| format!("participant '{role}' did not answer"))?;
        checkpoints
            .emit_with(
                Checkpoint::new(format!("{role} replied"))
                    .with_progress(1.0)
                    .with_payload(json!({ "reply": reply.clone() })),
            )
            .await?;

        Ok(json!({
            "participant": role,
            "input": input,
            "reply": reply,
        }))
    }

    async fn evaluate(&self, ctx: &AssessmentContext, collected: Collected) -> Result<AssessmentResult> {
        let input = input(ctx)?;
        let expected = ctx.config().get("expected").unwrap_or(input).clone();
        let reply = collected
            .output
            .get("reply")
            .cloned()
            .ok_or_else(|| anyhow!("run output carries no reply"))?;

        let matched = reply == expected;
        let score = if matched { 1.0 } else { 0.0 };
        Ok(AssessmentResult::new(ctx.task_id(), score, matched)
            .with_detail("expected", expected)
            .with_detail("reply", reply)
            .with_detail("checkpoints", json!(collected.checkpoints.len()))
            .with_artifact(Artifact::json(TRANSCRIPT_ARTIFACT, collected.output)))
    }
}

//! Structured lifecycle events for assessments and supervised roles.
//!
//! Every event carries an `event` field (`assessment.started`,
//! `role.ready`, ...) so log pipelines can filter on it. Spans returned by
//! [`scenario_span`] and [`assessment_span`] are attached to futures with
//! `tracing::Instrument`.

use tracing::{info, warn};

use crate::contract::{LifecycleFailure, TaskId, TaskStatus};

/// Span scoping every log line of one scenario run.
pub fn scenario_span(scenario: &str) -> tracing::Span {
    tracing::info_span!("greenroom.scenario", scenario = %scenario)
}

/// Span scoping every log line of one assessment task.
pub fn assessment_span(task_id: TaskId, benchmark: &str) -> tracing::Span {
    tracing::info_span!("greenroom.assessment", task_id = %task_id, benchmark = %benchmark)
}

pub fn emit_assessment_started(task_id: TaskId, benchmark: &str, participants: usize) {
    info!(
        event = "assessment.started",
        task_id = %task_id,
        benchmark = %benchmark,
        participants = participants,
    );
}

pub fn emit_phase_entered(task_id: TaskId, status: TaskStatus) {
    info!(event = "assessment.phase", task_id = %task_id, status = %status);
}

/// Emit event: assessment completed with a score.
pub fn emit_assessment_finished(task_id: TaskId, score: f64, passed: bool, duration_ms: u64) {
    info!(
        event = "assessment.finished",
        task_id = %task_id,
        score = score,
        passed = passed,
        duration_ms = duration_ms,
    );
}

/// Emit event: assessment ended in FAILED (no score).
pub fn emit_assessment_failed(task_id: TaskId, failure: &LifecycleFailure, duration_ms: u64) {
    warn!(
        event = "assessment.failed",
        task_id = %task_id,
        hook = %failure.hook,
        reason = %failure.reason,
        detail = %failure.detail,
        duration_ms = duration_ms,
    );
}

pub fn emit_role_spawned(role: &str, pid: Option<u32>, endpoint: &str) {
    info!(event = "role.spawned", role = %role, pid = ?pid, endpoint = %endpoint);
}

pub fn emit_role_ready(role: &str, waited_ms: u64) {
    info!(event = "role.ready", role = %role, waited_ms = waited_ms);
}

pub fn emit_role_stopped(role: &str, outcome: &str) {
    info!(event = "role.stopped", role = %role, outcome = %outcome);
}

/// Teardown problems are logged, never raised.
pub fn emit_teardown_error(role: &str, error: &dyn std::fmt::Display) {
    warn!(event = "teardown.error", role = %role, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{FailureReason, Hook};

    #[test]
    fn test_emitters_do_not_panic_without_subscriber() {
        let _span = scenario_span("smoke").entered();
        let id = TaskId::new();
        emit_assessment_started(id, "exact-match", 1);
        emit_phase_entered(id, TaskStatus::Running);
        emit_assessment_finished(id, 1.0, true, 12);
        emit_assessment_failed(
            id,
            &LifecycleFailure::new(Hook::Run, FailureReason::Timeout, "slow"),
            40,
        );
        emit_role_spawned("participant", Some(42), "http://127.0.0.1:9");
        emit_role_ready("participant", 5);
        emit_role_stopped("participant", "graceful");
        emit_teardown_error("participant", &"kill failed");
    }
}

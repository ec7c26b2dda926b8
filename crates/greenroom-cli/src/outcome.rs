//! Mapping from an assessment result to the process exit code.

use greenroom_core::AssessmentResult;

/// Exit code for any orchestration failure.
pub const EXIT_ORCHESTRATION_FAILURE: u8 = 2;

/// How a completed assessment is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    /// The evaluator passed it, but the score is below the scenario's
    /// `pass_threshold`.
    BelowThreshold,
    Failed,
}

impl Verdict {
    pub fn of(result: &AssessmentResult, pass_threshold: Option<f64>) -> Self {
        if !result.passed {
            return Verdict::Failed;
        }
        match pass_threshold {
            Some(threshold) if result.score < threshold => Verdict::BelowThreshold,
            _ => Verdict::Passed,
        }
    }

    pub fn exit_code(self) -> u8 {
        match self {
            Verdict::Passed => 0,
            Verdict::BelowThreshold | Verdict::Failed => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Passed => "passed",
            Verdict::BelowThreshold => "below_threshold",
            Verdict::Failed => "failed",
        }
    }
}

//! The scored outcome of a completed assessment.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::artifact::Artifact;
use super::error::ValidationError;
use super::task::TaskId;

/// Outcome of one COMPLETED assessment. Immutable once attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub task_id: TaskId,
    /// Normalized score in `[0, 1]`.
    pub score: f64,
    pub passed: bool,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl AssessmentResult {
    pub fn new(task_id: TaskId, score: f64, passed: bool) -> Self {
        Self {
            task_id,
            score,
            passed,
            details: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.score.is_finite() || !(0.0..=1.0).contains(&self.score) {
            return Err(ValidationError::new(
                "score",
                format!("{} is outside [0, 1]", self.score),
            ));
        }
        if self.details.keys().any(|k| k.trim().is_empty()) {
            return Err(ValidationError::new("details", "keys must not be empty"));
        }
        let mut seen = HashSet::new();
        for (i, artifact) in self.artifacts.iter().enumerate() {
            let at = format!("artifacts[{i}]");
            artifact.validate().map_err(|e| e.within(&at))?;
            if !seen.insert(artifact.name.as_str()) {
                return Err(ValidationError::new(
                    format!("{at}.name"),
                    format!("duplicate artifact '{}'", artifact.name),
                ));
            }
        }
        Ok(())
    }
}

//! Declarative scenario description (TOML) and its validation.
//!
//! ```toml
//! [[roles]]
//! name = "evaluator"
//! launch_command = ["greenroomd", "exact-match", "--port", "9018"]
//! endpoint = "http://127.0.0.1:9018"
//!
//! [[roles]]
//! name = "participant"
//! launch_command = "greenroomd echo --port 9019"
//! endpoint = "http://127.0.0.1:9019"
//!
//! [assessment]
//! evaluator = "evaluator"
//! participants = ["participant"]
//!
//! [assessment.config]
//! input = "5"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::contract::{AssessmentConfig, Endpoint, Participant, TaskId, TaskSubmission, ValidationError};

use super::error::{ScenarioError, ScenarioResult};

pub const DEFAULT_HEALTH_PATH: &str = "/health";
pub const DEFAULT_EVALUATOR_ROLE: &str = "evaluator";

/// How to start a role: a shell line or an explicit argv.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LaunchCommand {
    Shell(String),
    Argv(Vec<String>),
}

impl LaunchCommand {
    pub fn is_empty(&self) -> bool {
        match self {
            LaunchCommand::Shell(line) => line.trim().is_empty(),
            LaunchCommand::Argv(argv) => argv.first().map_or(true, |p| p.trim().is_empty()),
        }
    }

    /// Program and arguments. Shell lines run as `sh -c "exec <line>"` so the
    /// supervised PID is the agent itself.
    pub fn program(&self) -> (String, Vec<String>) {
        match self {
            LaunchCommand::Shell(line) => (
                "sh".to_string(),
                vec!["-c".to_string(), format!("exec {line}")],
            ),
            LaunchCommand::Argv(argv) => {
                let program = argv.first().cloned().unwrap_or_default();
                (program, argv.iter().skip(1).cloned().collect())
            }
        }
    }
}

impl std::fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchCommand::Shell(line) => f.write_str(line),
            LaunchCommand::Argv(argv) => f.write_str(&argv.join(" ")),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioFile {
    name: Option<String>,
    #[serde(default)]
    roles: Vec<RoleFile>,
    #[serde(default)]
    assessment: AssessmentFile,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RoleFile {
    name: String,
    launch_command: LaunchCommand,
    endpoint: String,
    health_check_path: Option<String>,
    startup_timeout_secs: Option<u64>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AssessmentFile {
    evaluator: Option<String>,
    participants: Option<Vec<String>>,
    pass_threshold: Option<f64>,
    timeout_secs: Option<u64>,
    #[serde(default)]
    config: AssessmentConfig,
}

/// One supervised role.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleDefinition {
    pub name: String,
    pub launch_command: LaunchCommand,
    pub endpoint: Endpoint,
    pub health_check_path: String,
    /// Overrides the orchestrator's default startup timeout.
    pub startup_timeout: Option<Duration>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentSpec {
    pub evaluator: String,
    /// Participant roles in declaration order.
    pub participants: Vec<String>,
    pub config: AssessmentConfig,
    /// Minimum score for a pass, applied on top of the result's own flag.
    pub pass_threshold: Option<f64>,
    /// Streaming budget; overrides the orchestrator default.
    pub timeout: Option<Duration>,
}

/// A validated scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    /// Roles in launch order.
    pub roles: Vec<RoleDefinition>,
    pub assessment: AssessmentSpec,
    /// Working directory for launch commands.
    pub base_dir: PathBuf,
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> ScenarioResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut scenario = Self::from_toml_str(&text, base_dir)?;
        if scenario.name.is_empty() {
            if let Some(stem) = path.file_stem() {
                scenario.name = stem.to_string_lossy().into_owned();
            }
        }
        Ok(scenario)
    }

    /// Parse and validate. `name` is left empty when the file has none.
    pub fn from_toml_str(text: &str, base_dir: impl Into<PathBuf>) -> ScenarioResult<Self> {
        let file: ScenarioFile = toml::from_str(text)?;
        Ok(build(file, base_dir.into())?)
    }

    pub fn role(&self, name: &str) -> Option<&RoleDefinition> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn evaluator(&self) -> Option<&RoleDefinition> {
        self.role(&self.assessment.evaluator)
    }

    /// The envelope submitted to the evaluator for a new task.
    pub fn submission(&self, task_id: TaskId) -> TaskSubmission {
        let participants = self
            .assessment
            .participants
            .iter()
            .filter_map(|name| self.role(name))
            .map(|role| Participant {
                role: role.name.clone(),
                endpoint: role.endpoint.clone(),
            })
            .collect();
        TaskSubmission {
            task_id,
            role: self.assessment.evaluator.clone(),
            participants,
            config: self.assessment.config.clone(),
        }
    }
}

fn build(file: ScenarioFile, base_dir: PathBuf) -> Result<Scenario, ValidationError> {
    if file.roles.is_empty() {
        return Err(ValidationError::new("roles", "at least one role is required"));
    }

    let mut names = HashSet::new();
    let mut endpoints = HashSet::new();
    let mut roles = Vec::with_capacity(file.roles.len());
    for (i, raw) in file.roles.into_iter().enumerate() {
        let at = |field: &str| format!("roles[{i}].{field}");
        if raw.name.trim().is_empty() {
            return Err(ValidationError::new(at("name"), "must not be empty"));
        }
        if !names.insert(raw.name.clone()) {
            return Err(ValidationError::new(
                at("name"),
                format!("duplicate role '{}'", raw.name),
            ));
        }
        if raw.launch_command.is_empty() {
            return Err(ValidationError::new(at("launch_command"), "must not be empty"));
        }
        let endpoint = Endpoint::parse(&raw.endpoint)
            .map_err(|e| ValidationError::new(at("endpoint"), e.reason))?;
        if !endpoints.insert(endpoint.to_string()) {
            return Err(ValidationError::new(
                at("endpoint"),
                format!("{endpoint} is used by another role"),
            ));
        }
        let health_check_path = raw
            .health_check_path
            .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string());
        if !health_check_path.starts_with('/') {
            return Err(ValidationError::new(at("health_check_path"), "must start with '/'"));
        }
        if raw.startup_timeout_secs == Some(0) {
            return Err(ValidationError::new(at("startup_timeout_secs"), "must be positive"));
        }
        roles.push(RoleDefinition {
            name: raw.name,
            launch_command: raw.launch_command,
            endpoint,
            health_check_path,
            startup_timeout: raw.startup_timeout_secs.map(Duration::from_secs),
            env: raw.env,
        });
    }

    let assessment = file.assessment;
    let evaluator = assessment
        .evaluator
        .unwrap_or_else(|| DEFAULT_EVALUATOR_ROLE.to_string());
    if !names.contains(&evaluator) {
        return Err(ValidationError::new(
            "assessment.evaluator",
            format!("no role named '{evaluator}'"),
        ));
    }

    let participants = match assessment.participants {
        Some(list) => list,
        None => roles
            .iter()
            .map(|r| r.name.clone())
            .filter(|name| *name != evaluator)
            .collect(),
    };
    if participants.is_empty() {
        return Err(ValidationError::new(
            "assessment.participants",
            "at least one participant is required",
        ));
    }
    let mut seen = HashSet::new();
    for (i, name) in participants.iter().enumerate() {
        let at = format!("assessment.participants[{i}]");
        if *name == evaluator {
            return Err(ValidationError::new(at, "the evaluator cannot be a participant"));
        }
        if !names.contains(name) {
            return Err(ValidationError::new(at, format!("no role named '{name}'")));
        }
        if !seen.insert(name.as_str()) {
            return Err(ValidationError::new(at, format!("duplicate participant '{name}'")));
        }
    }

    if let Some(threshold) = assessment.pass_threshold {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(ValidationError::new(
                "assessment.pass_threshold",
                format!("{threshold} is outside [0, 1]"),
            ));
        }
    }
    if assessment.timeout_secs == Some(0) {
        return Err(ValidationError::new("assessment.timeout_secs", "must be positive"));
    }

    Ok(Scenario {
        name: file.name.unwrap_or_default(),
        roles,
        assessment: AssessmentSpec {
            evaluator,
            participants,
            config: assessment.config,
            pass_threshold: assessment.pass_threshold,
            timeout: assessment.timeout_secs.map(Duration::from_secs),
        },
        base_dir,
    })
}

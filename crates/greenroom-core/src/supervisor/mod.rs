//! Process supervisor: launch the roles of a scenario, wait for health,
//! drive one assessment through the evaluator and tear everything down.
//!
//! Teardown always runs, in reverse launch order, whatever the outcome of
//! the run; its problems are logged in the [`TeardownReport`] and never
//! replace the primary result.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod scenario;

pub use config::OrchestratorConfig;
pub use error::{ScenarioError, ScenarioResult, SupervisorError, SupervisorResult};
pub use orchestrator::{Observer, Orchestrator, ScenarioHandle, StoppedRole, TeardownReport};
pub use process::{HealthState, RoleProcess, StopOutcome};
pub use scenario::{
    AssessmentSpec, LaunchCommand, RoleDefinition, Scenario, DEFAULT_EVALUATOR_ROLE,
    DEFAULT_HEALTH_PATH,
};

//! Greenroom core library
//!
//! Assessment orchestration for agent benchmarks: a green (evaluator) agent
//! scores one or more participant agents over HTTP while a supervisor owns
//! their processes.
//!
//! * [`contract`] - validated message shapes shared by every role
//! * [`client`] - retrying HTTP client for one remote agent
//! * [`lifecycle`] - evaluator hook sequencing (`GreenExecutor`)
//! * [`server`] - axum host exposing an evaluator or participant
//! * [`supervisor`] - scenario loading, process launch and teardown

pub mod client;
pub mod contract;
pub mod lifecycle;
pub mod metrics;
pub mod obs;
pub mod server;
pub mod supervisor;
pub mod telemetry;

pub use client::{AgentClient, ClientConfig, ClientError, ClientResult, RetryPolicy, UpdateStream};

pub use contract::{
    AgentCard, Artifact, ArtifactContent, AssessmentConfig, AssessmentResult, Endpoint,
    FailureReason, Hook, LifecycleFailure, Participant, ParticipantMessage, StatusUpdate, Task,
    TaskId, TaskStatus, TaskSubmission, ValidationError,
};

pub use lifecycle::{
    AssessmentContext, Benchmark, CancelHandle, CancelSignal, Checkpoint, Checkpoints, Collected,
    GreenExecutor, LifecycleError, TaskRegistry,
};

pub use server::{AgentHost, ParticipantAgent, RunningHost};

pub use supervisor::{
    Orchestrator, OrchestratorConfig, Scenario, ScenarioError, ScenarioHandle, SupervisorError,
    SupervisorResult, TeardownReport,
};

pub use metrics::METRICS;
pub use telemetry::init_tracing;

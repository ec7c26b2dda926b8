//! Message contract: validated data shapes exchanged between roles.
//!
//! Pure construction and validation. Malformed input is rejected with a
//! [`ValidationError`] naming the offending field.

pub mod artifact;
pub mod envelope;
pub mod error;
pub mod failure;
pub mod result;
pub mod task;
pub mod update;

pub use artifact::{Artifact, ArtifactContent};
pub use envelope::{
    AgentCard, AssessmentConfig, CancelAck, Endpoint, ErrorBody, HealthReport, Participant,
    ParticipantMessage, ParticipantReply, SubmitAck, TaskSnapshot, TaskSubmission,
};
pub use error::{TransitionError, ValidationError};
pub use failure::{FailureReason, Hook, LifecycleFailure};
pub use result::AssessmentResult;
pub use task::{Task, TaskId, TaskStatus};
pub use update::StatusUpdate;

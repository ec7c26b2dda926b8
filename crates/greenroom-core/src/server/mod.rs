//! HTTP side of the message contract.
//!
//! An [`AgentHost`] exposes a [`GreenExecutor`](crate::lifecycle::GreenExecutor)
//! (`/tasks/...`), a [`ParticipantAgent`] (`/message`), or both, plus the
//! `/health`, `/card` and `/shutdown` routes every supervised agent serves.

pub mod error;
pub mod host;
pub mod participant;
mod routes;

pub use error::{ApiError, HostError, HostResult};
pub use host::{AgentHost, BoundHost, RunningHost};
pub use participant::ParticipantAgent;

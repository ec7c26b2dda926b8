//! Agent client: one logical remote operation against one agent endpoint.
//!
//! Transient transport failures are retried with bounded exponential backoff;
//! everything else surfaces immediately as a [`ClientError`].

pub mod agent_client;
pub mod error;
pub mod retry;
pub mod stream;

pub use agent_client::{AgentClient, ClientConfig};
pub use error::{ClientError, ClientResult};
pub use retry::{with_retry, RetryPolicy};
pub use stream::UpdateStream;

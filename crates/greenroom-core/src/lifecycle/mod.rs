//! Evaluator lifecycle: `created → setup → running → evaluating → completed`,
//! with `failed` reachable from every non-terminal state.
//!
//! A concrete benchmark implements [`Benchmark`]; the [`GreenExecutor`] owns
//! sequencing, cooperative cancellation and error translation, and records
//! everything in a [`TaskRegistry`].

pub mod benchmark;
pub mod cancel;
pub mod context;
pub mod error;
pub mod executor;
pub mod registry;

pub use benchmark::{Benchmark, Checkpoint, Checkpoints, Collected};
pub use cancel::{cancellation, CancelHandle, CancelSignal, Cancelled};
pub use context::AssessmentContext;
pub use error::{LifecycleError, LifecycleResult};
pub use executor::{classify, GreenExecutor, DEFAULT_CHECKPOINT_CAPACITY};
pub use registry::{ResultLookup, TaskRegistry, DEFAULT_RETENTION};

//! # Orchestrator
//!
//! Runs a pipeline of [`contracts::Stage`]s in declaration order.
//!
//! Responsibilities:
//! - Check the stage contract chain before anything runs
//! - Pass each stage output forward through the shared [`contracts::PipelineState`]
//! - Retry retryable failures with exponential backoff and jitter
//! - Bound every attempt with a timeout
//! - Merge the final state into an [`contracts::AggregatedReport`]

pub mod aggregate;
mod error;
mod pipeline;
pub mod retry;

pub use aggregate::aggregate;
pub use error::{OrchestratorError, Result};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineOutcome};
pub use retry::backoff_delay;

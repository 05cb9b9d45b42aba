//! Orchestrator error types

use contracts::{ContractError, StageRecord};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Stage contract chain does not hold
    #[error("invalid pipeline '{pipeline}': {reason}")]
    InvalidPipeline { pipeline: String, reason: String },

    /// Caller did not supply a declared seed key
    #[error("pipeline '{pipeline}' is missing seed key '{key}'")]
    MissingSeed { pipeline: String, key: String },

    /// A stage failed in fail-fast mode; records cover every stage run so far
    #[error("stage '{stage}' failed after {attempts} attempt(s): {source}")]
    StageFailed {
        stage: String,
        attempts: u32,
        #[source]
        source: ContractError,
        records: Vec<StageRecord>,
    },

    /// Aggregation error (from contract)
    #[error("aggregation error: {0}")]
    Contract(#[from] ContractError),
}

impl OrchestratorError {
    pub fn invalid(pipeline: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPipeline {
            pipeline: pipeline.into(),
            reason: reason.into(),
        }
    }

    /// Stage records collected before the failure, if any
    pub fn records(&self) -> &[StageRecord] {
        match self {
            Self::StageFailed { records, .. } => records,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

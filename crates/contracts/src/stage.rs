//! Stage trait - the unit of work the orchestrator sequences
//!
//! A stage declares which state keys it reads (`requires`) and the single
//! key it writes (`produces`). The orchestrator checks the chain before the
//! run and performs the write itself, so stages only ever return a value.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ContractError, PipelineState};

/// Declared data contract of a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub name: String,
    pub requires: Vec<String>,
    pub produces: String,
}

impl StageDescriptor {
    pub fn new(
        name: impl Into<String>,
        requires: impl IntoIterator<Item = impl Into<String>>,
        produces: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            requires: requires.into_iter().map(Into::into).collect(),
            produces: produces.into(),
        }
    }
}

/// What a stage sees for one attempt
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub run_id: &'a str,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
    pub state: &'a PipelineState,
}

impl StageContext<'_> {
    /// No retry will follow a failure of this attempt
    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Result of a successful stage attempt
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub value: Value,
    /// Number of hosted model calls made by this attempt
    pub model_calls: u32,
    /// Free-form remarks surfaced in the run summary (degraded paths etc.)
    pub notes: Vec<String>,
}

impl StageOutput {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            model_calls: 0,
            notes: Vec::new(),
        }
    }

    /// Serialize a typed result as the stage value
    pub fn typed<T: Serialize>(stage: &str, value: &T) -> Result<Self, ContractError> {
        serde_json::to_value(value)
            .map(Self::new)
            .map_err(|e| ContractError::stage_output(stage, format!("serialize failed: {e}")))
    }

    pub fn with_model_calls(mut self, calls: u32) -> Self {
        self.model_calls = calls;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Pipeline stage
///
/// Implementations must be idempotent per attempt: a retried attempt starts
/// from the same state and its output replaces, never merges with, a prior
/// failed attempt.
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    fn descriptor(&self) -> &StageDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Run one attempt
    ///
    /// # Errors
    /// Retryable errors (see [`ContractError::is_retryable`]) make the
    /// orchestrator try again under its retry policy.
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, ContractError>;
}

/// Terminal status of a stage in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Execution record of a single stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub attempts: u32,
    pub duration_ms: u64,
    pub model_calls: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl StageRecord {
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Skipped,
            attempts: 0,
            duration_ms: 0,
            model_calls: 0,
            error: None,
            notes: vec![reason.into()],
        }
    }
}

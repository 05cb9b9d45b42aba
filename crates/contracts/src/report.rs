//! Aggregated report and the ReportSink output interface

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ContractError, FinancialReport, ReferralReport, StageRecord, StageStatus};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every stage succeeded
    Completed,
    /// At least one stage failed or was skipped (continue-on-error mode)
    Partial,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Partial => f.write_str("partial"),
        }
    }
}

/// Execution summary attached to every report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub pipeline: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stages: Vec<StageRecord>,
}

impl RunSummary {
    pub fn total_model_calls(&self) -> u32 {
        self.stages.iter().map(|s| s.model_calls).sum()
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|s| s.status == status).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ReportBody {
    Financial(FinancialReport),
    Referral(ReferralReport),
    /// Every produced state value, for custom pipelines
    Generic(BTreeMap<String, Value>),
}

/// Final structured result of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub run: RunSummary,
    pub body: ReportBody,
}

impl AggregatedReport {
    /// Who / what the report is about (used in titles and file names)
    pub fn subject(&self) -> &str {
        match &self.body {
            ReportBody::Financial(r) => &r.company_name,
            ReportBody::Referral(r) => &r.student.name,
            ReportBody::Generic(_) => &self.run.pipeline,
        }
    }

    /// File-name label for the report kind
    pub fn kind_label(&self) -> &'static str {
        match &self.body {
            ReportBody::Financial(_) => "analysis",
            ReportBody::Referral(_) => "referrals",
            ReportBody::Generic(_) => "report",
        }
    }

    pub fn report_type(&self) -> &'static str {
        match &self.body {
            ReportBody::Financial(_) => "financial_analysis",
            ReportBody::Referral(_) => "alumni_referral",
            ReportBody::Generic(_) => "pipeline_output",
        }
    }
}

/// Report output trait
///
/// All report sinks must implement this trait.
#[trait_variant::make(ReportSink: Send)]
pub trait LocalReportSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one report
    ///
    /// Returns the artifact path for file-backed sinks.
    async fn write(&mut self, report: &AggregatedReport) -> Result<Option<PathBuf>, ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}

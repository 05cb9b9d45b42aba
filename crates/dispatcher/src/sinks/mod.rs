//! Sink implementations
//!
//! Contains MarkdownSink, JsonSink, SummarySink and LogSink.

mod json;
mod log;
mod markdown;
mod summary;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use contracts::{AggregatedReport, ContractError};

pub use self::json::JsonSink;
pub use self::log::LogSink;
pub use self::markdown::{render_markdown, MarkdownSink};
pub use self::summary::{render_summary, SummarySink};

/// Default directory for file-backed sinks
pub const DEFAULT_OUTPUT_DIR: &str = "output/generated_reports";

/// Resolve `output_dir` from sink params
pub fn output_dir_from_params(params: &HashMap<String, String>) -> PathBuf {
    params
        .get("output_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}

/// `{Subject}_{analysis|referrals|report}_{YYYYmmdd_HHMMSS}.{ext}`
pub fn report_file_name(report: &AggregatedReport, ext: &str, at: DateTime<Local>) -> String {
    let subject: String = report
        .subject()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    let subject = if subject.is_empty() { "report".to_string() } else { subject };
    format!(
        "{subject}_{}_{}.{ext}",
        report.kind_label(),
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Write one rendered report under `dir`, creating it when needed
pub(crate) async fn write_artifact(
    sink_name: &str,
    dir: &Path,
    file_name: String,
    contents: String,
) -> Result<PathBuf, ContractError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ContractError::sink_write(sink_name, format!("create {}: {e}", dir.display())))?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, contents)
        .await
        .map_err(|e| ContractError::sink_write(sink_name, format!("write {}: {e}", path.display())))?;
    Ok(path)
}

/// Shared fixtures for sink tests
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use contracts::{
        AggregatedReport, FinancialAnalysis, FinancialReport, ReportBody, RunStatus, RunSummary,
        StageRecord, StageStatus,
    };
    use serde_json::json;

    pub fn run_summary() -> RunSummary {
        RunSummary {
            run_id: "run-42".into(),
            pipeline: "financial_report_analyzer".into(),
            status: RunStatus::Completed,
            started_at: Utc::now(),
            duration_ms: 1_250,
            stages: vec![StageRecord {
                name: "analyze_financials".into(),
                status: StageStatus::Succeeded,
                attempts: 2,
                duration_ms: 1_200,
                model_calls: 2,
                error: None,
                notes: vec!["first attempt timed out".into()],
            }],
        }
    }

    pub fn financial_report() -> AggregatedReport {
        let analysis: FinancialAnalysis = serde_json::from_value(json!({
            "executive_summary": "Profit rose on higher net interest income.",
            "key_metrics": {
                "net_income": {"value": "EUR 1.2B", "change": "+12%", "period": "FY2024"},
                "revenue": {"value": "EUR 5.4B", "change": "+4%", "period": "FY2024"}
            },
            "balance_sheet": {"total_assets": {"value": "EUR 300B", "change": "+2%"}},
            "financial_ratios": {"cet1_ratio": {"value": "15.1%", "target": "> 13%"}},
            "trends_analysis": ["Deposits grew steadily"],
            "risk_assessment": {"credit_quality": "Stable", "key_risks": ["Rate cuts"]},
            "recommendations": ["Keep cost discipline", "Grow fee income"]
        }))
        .unwrap();
        AggregatedReport {
            run: run_summary(),
            body: ReportBody::Financial(FinancialReport {
                company_name: "Acme Bank Group".into(),
                generated_at: Utc::now(),
                image_sources: vec!["page1.png".into()],
                skipped_images: Vec::new(),
                analysis,
                metrics: None,
                validation: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_report_file_name() {
        let report = fixtures::financial_report();
        let at = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(
            report_file_name(&report, "md", at),
            "Acme_Bank_Group_analysis_20240305_140709.md"
        );
    }

    #[test]
    fn test_output_dir_default() {
        assert_eq!(
            output_dir_from_params(&HashMap::new()),
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        );
    }
}

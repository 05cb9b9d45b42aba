//! SummarySink - plain-text executive summary

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Local;
use contracts::{AggregatedReport, ContractError, ReportBody, ReportSink, StageStatus};
use tracing::{debug, instrument};

use super::{output_dir_from_params, report_file_name, write_artifact};

const TOP_ITEMS: usize = 5;

/// Sink that writes a short `.txt` summary per report
pub struct SummarySink {
    name: String,
    output_dir: PathBuf,
}

impl SummarySink {
    pub fn new(name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Create from params map (for factory)
    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> Self {
        Self::new(name, output_dir_from_params(params))
    }
}

pub fn render_summary(report: &AggregatedReport) -> String {
    let run = &report.run;
    let title = format!("{} SUMMARY", report.report_type().replace('_', " ").to_uppercase());
    let mut lines = vec![
        title.clone(),
        "=".repeat(title.len()),
        format!("Subject: {}", report.subject()),
        format!(
            "Run: {} ({}) {} in {} ms, {} model call(s)",
            run.run_id,
            run.pipeline,
            run.status,
            run.duration_ms,
            run.total_model_calls()
        ),
        format!(
            "Stages: {} succeeded, {} failed, {} skipped",
            run.count(StageStatus::Succeeded),
            run.count(StageStatus::Failed),
            run.count(StageStatus::Skipped)
        ),
        String::new(),
    ];

    match &report.body {
        ReportBody::Financial(r) => {
            if let Some(summary) = &r.analysis.executive_summary {
                lines.push(summary.clone());
                lines.push(String::new());
            }
            lines.push(format!("Key metrics ({}):", r.analysis.key_metrics.len()));
            for (name, entry) in r.analysis.key_metrics.iter().take(TOP_ITEMS) {
                let change = entry
                    .change
                    .as_deref()
                    .map(|c| format!(" ({c})"))
                    .unwrap_or_default();
                lines.push(format!(
                    "  {name}: {}{change}",
                    entry.value.as_deref().unwrap_or("N/A")
                ));
            }
            if let Some(v) = &r.validation {
                if !v.missing_fields.is_empty() {
                    lines.push(format!("Missing fields: {}", v.missing_fields.join(", ")));
                }
                for warning in &v.warnings {
                    lines.push(format!("Warning: {warning}"));
                }
            }
            lines.push(format!(
                "Documents analyzed: {} ({} skipped)",
                r.image_sources.len(),
                r.skipped_images.len()
            ));
        }
        ReportBody::Referral(r) => {
            let s = &r.summary;
            lines.push(format!(
                "Alumni considered: {}, matches: {} ({} high potential), paths: {}, messages: {}",
                s.alumni_considered,
                s.matches_found,
                s.high_potential_matches,
                s.paths_recommended,
                s.messages_generated
            ));
            if let Some(top) = &s.top_recommendation {
                lines.push(format!("Top recommendation: {top}"));
            }
            for m in r.matches.iter().take(TOP_ITEMS) {
                lines.push(format!(
                    "  {:.2}  {} - {} at {}",
                    m.match_score, m.alumni.name, m.alumni.current_role, m.alumni.current_company
                ));
            }
        }
        ReportBody::Generic(values) => {
            lines.push(format!("Outputs: {}", values.keys().cloned().collect::<Vec<_>>().join(", ")));
        }
    }

    lines.push(String::new());
    lines.join("\n")
}

impl ReportSink for SummarySink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "summary_sink_write",
        skip(self, report),
        fields(sink = %self.name, run_id = %report.run.run_id)
    )]
    async fn write(&mut self, report: &AggregatedReport) -> Result<Option<PathBuf>, ContractError> {
        let file_name = report_file_name(report, "txt", Local::now());
        let path =
            write_artifact(&self.name, &self.output_dir, file_name, render_summary(report)).await?;
        debug!(path = %path.display(), "summary written");
        Ok(Some(path))
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::fixtures;

    #[test]
    fn test_financial_summary() {
        let text = render_summary(&fixtures::financial_report());
        assert!(text.starts_with(&format!("FINANCIAL ANALYSIS SUMMARY\n{}\n", "=".repeat(26))));
        assert!(text.contains("Subject: Acme Bank Group"));
        assert!(text.contains("Stages: 1 succeeded, 0 failed, 0 skipped"));
        assert!(text.contains("  net_income: EUR 1.2B (+12%)"), "got: {text}");
        assert!(text.contains("Documents analyzed: 1 (0 skipped)"));
    }

    #[tokio::test]
    async fn test_summary_sink_writes_txt() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SummarySink::new("summary", dir.path());
        let path = sink
            .write(&fixtures::financial_report())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(path.extension().unwrap(), "txt");
    }
}

//! MarkdownSink - renders reports as Markdown documents

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::Local;
use contracts::{
    AggregatedReport, ContractError, FinancialReport, MetricEntry, ReferralReport, ReportBody,
    ReportSink, RunSummary,
};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{output_dir_from_params, report_file_name, write_artifact};

const NA: &str = "N/A";

/// Sink that writes one `.md` file per report
pub struct MarkdownSink {
    name: String,
    output_dir: PathBuf,
}

impl MarkdownSink {
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

impl ReportSink for MarkdownSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "markdown_sink_write",
        skip(self, report),
        fields(sink = %self.name, run_id = %report.run.run_id)
    )]
    async fn write(&mut self, report: &AggregatedReport) -> Result<Option<PathBuf>, ContractError> {
        let file_name = report_file_name(report, "md", Local::now());
        let path =
            write_artifact(&self.name, &self.output_dir, file_name, render_markdown(report)).await?;
        debug!(path = %path.display(), "markdown report written");
        Ok(Some(path))
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

/// `net_income` -> `Net Income`
fn display_name(key: &str) -> String {
    key.split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn cell(value: Option<&String>) -> &str {
    value.map(String::as_str).unwrap_or(NA)
}

pub fn render_markdown(report: &AggregatedReport) -> String {
    let mut out = match &report.body {
        ReportBody::Financial(r) => render_financial(r),
        ReportBody::Referral(r) => render_referral(r),
        ReportBody::Generic(values) => render_generic(&report.run.pipeline, values),
    };
    out.push_str(&render_run(&report.run));
    out
}

fn metric_table(out: &mut String, header: &str, rows: &BTreeMap<String, MetricEntry>) {
    out.push_str(header);
    for (name, entry) in rows {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            display_name(name),
            cell(entry.value.as_ref()),
            cell(entry.change.as_ref()),
            cell(entry.period.as_ref()),
        ));
    }
}

fn render_financial(r: &FinancialReport) -> String {
    let a = &r.analysis;
    let mut out = format!(
        "# Financial Analysis Report\n## {}\n\n*Generated on: {}*\n\n---\n\n## Executive Summary\n\n{}\n\n",
        r.company_name,
        r.generated_at.with_timezone(&Local).format("%B %d, %Y at %I:%M %p"),
        a.executive_summary
            .as_deref()
            .unwrap_or("Executive summary not available."),
    );

    if a.is_unstructured() {
        out.push_str(&format!(
            "## Analysis\n\n{}\n\n",
            a.analysis.as_deref().unwrap_or_default()
        ));
    }

    if !a.key_metrics.is_empty() {
        metric_table(
            &mut out,
            "## Key Financial Metrics\n\n| Metric | Current Value | Change | Period |\n|--------|---------------|--------|--------|\n",
            &a.key_metrics,
        );
    }

    if !a.balance_sheet.is_empty() {
        out.push_str("\n## Balance Sheet Highlights\n\n| Item | Current Value | Change |\n|------|---------------|--------|\n");
        for (name, entry) in &a.balance_sheet {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                display_name(name),
                cell(entry.value.as_ref()),
                cell(entry.change.as_ref()),
            ));
        }
    }

    if !a.financial_ratios.is_empty() {
        out.push_str("\n## Financial Ratios\n\n| Ratio | Current Value | Target/Requirement | Status |\n|-------|---------------|--------------------|--------|\n");
        for (name, entry) in &a.financial_ratios {
            let status = match (&entry.status, &entry.target) {
                (Some(s), _) => s.as_str(),
                (None, Some(_)) => "Meeting",
                (None, None) => "Tracking",
            };
            out.push_str(&format!(
                "| {} | {} | {} | {status} |\n",
                display_name(name),
                cell(entry.value.as_ref()),
                cell(entry.target.as_ref()),
            ));
        }
    }

    if !a.trends_analysis.is_empty() {
        out.push_str("\n## Trends Analysis\n\n");
        for trend in &a.trends_analysis {
            out.push_str(&format!("- {trend}\n"));
        }
    }

    if let Some(risk) = &a.risk_assessment {
        out.push_str("\n## Risk Assessment\n\n");
        if let Some(q) = &risk.credit_quality {
            out.push_str(&format!("**Credit Quality:** {q}\n\n"));
        }
        if let Some(s) = &risk.regulatory_status {
            out.push_str(&format!("**Regulatory Status:** {s}\n\n"));
        }
        if !risk.key_risks.is_empty() {
            out.push_str("**Key Risks Identified:**\n");
            for item in &risk.key_risks {
                out.push_str(&format!("- {item}\n"));
            }
        }
    }

    if !a.recommendations.is_empty() {
        out.push_str("\n## Recommendations\n\n");
        for (i, rec) in a.recommendations.iter().enumerate() {
            out.push_str(&format!("{}. {rec}\n", i + 1));
        }
    }

    if let Some(metrics) = r.metrics.as_ref().filter(|m| !m.is_empty()) {
        out.push('\n');
        metric_table(
            &mut out,
            "## Extracted Metrics\n\n| Metric | Value | Change | Period |\n|--------|-------|--------|--------|\n",
            metrics,
        );
    }

    if let Some(v) = &r.validation {
        out.push_str("\n## Data Validation\n\n");
        if v.missing_fields.is_empty() {
            out.push_str("All required fields present.\n");
        } else {
            out.push_str(&format!("**Missing fields:** {}\n", v.missing_fields.join(", ")));
        }
        for warning in &v.warnings {
            out.push_str(&format!("- Warning: {warning}\n"));
        }
        for (metric, growth) in &v.derived_changes {
            out.push_str(&format!("- Recomputed {}: {growth:+.2}%\n", display_name(metric)));
        }
    }

    out.push_str("\n## Source Documents\n\n");
    for source in &r.image_sources {
        out.push_str(&format!("- {source}\n"));
    }
    for skipped in &r.skipped_images {
        out.push_str(&format!("- ~~{}~~ (skipped: {})\n", skipped.source, skipped.reason));
    }
    out
}

fn render_referral(r: &ReferralReport) -> String {
    let s = &r.summary;
    let mut out = format!(
        "# Alumni Referral Report\n## {} ({}, class of {})\n\n*Generated on: {}*\n\n---\n\n## Summary\n\n",
        r.student.name,
        r.student.university,
        r.student.graduation_year,
        r.generated_at.with_timezone(&Local).format("%B %d, %Y at %I:%M %p"),
    );
    out.push_str(&format!("- Alumni considered: {}\n", s.alumni_considered));
    out.push_str(&format!(
        "- Matches found: {} ({} high potential)\n",
        s.matches_found, s.high_potential_matches
    ));
    out.push_str(&format!("- Referral paths: {}\n", s.paths_recommended));
    out.push_str(&format!("- Messages drafted: {}\n", s.messages_generated));
    if let Some(top) = &s.top_recommendation {
        out.push_str(&format!("- **Top recommendation:** {top}\n"));
    }

    if !r.matches.is_empty() {
        out.push_str("\n## Alumni Matches\n\n| # | Alumni | Company | Role | Score | Referral Potential | Contact |\n|---|--------|---------|------|-------|--------------------|---------|\n");
        for (i, m) in r.matches.iter().enumerate() {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {:.2} | {} | {} |\n",
                i + 1,
                m.alumni.name,
                m.alumni.current_company,
                m.alumni.current_role,
                m.match_score,
                m.referral_potential,
                m.contact_feasibility,
            ));
        }
        for m in r.matches.iter().filter(|m| m.insights.is_some()) {
            out.push_str(&format!(
                "\n**{}:** {}\n",
                m.alumni.name,
                m.insights.as_deref().unwrap_or_default()
            ));
        }
    }

    if !r.paths.is_empty() {
        out.push_str("\n## Referral Paths\n");
        for (i, p) in r.paths.iter().enumerate() {
            out.push_str(&format!(
                "\n### {}. {} at {} ({} path)\n\n- Path score: {:.2} ({} confidence)\n- Success probability: {:.0}%\n- Expected response: {}\n",
                i + 1,
                p.alumni_name,
                p.alumni_company,
                p.path_type,
                p.path_score,
                p.confidence,
                p.success_probability * 100.0,
                p.estimated_response_time,
            ));
            if !p.risk_factors.is_empty() {
                out.push_str(&format!("- Risks: {}\n", p.risk_factors.join("; ")));
            }
            for (n, step) in p.next_steps.iter().enumerate() {
                out.push_str(&format!("  {}. {step}\n", n + 1));
            }
        }
    }

    if !r.outreach.is_empty() {
        out.push_str("\n## Outreach Plan\n");
        for plan in &r.outreach {
            out.push_str(&format!(
                "\n### {} ({})\n\n**Primary channel:** {} (alternative: {})\n\n**Timing:** {}\n\n**Follow-up:**\n",
                plan.recipient,
                plan.company,
                plan.approach.primary_channel,
                plan.approach.alternative_channel,
                plan.approach.timing_advice,
            ));
            for step in &plan.approach.follow_up_schedule {
                out.push_str(&format!("- {step}\n"));
            }
            for msg in &plan.messages {
                out.push_str(&format!(
                    "\n#### {} message ({} words, personalization {:.0}%)\n\n",
                    display_name(&msg.channel.to_string()),
                    msg.word_count,
                    msg.personalization_score * 100.0,
                ));
                if let Some(subject) = &msg.subject {
                    out.push_str(&format!("**Subject:** {subject}\n\n"));
                }
                for line in msg.body.lines() {
                    out.push_str(&format!("> {line}\n"));
                }
            }
        }
    }
    out
}

fn render_generic(pipeline: &str, values: &BTreeMap<String, Value>) -> String {
    let mut out = format!("# {} Report\n", display_name(pipeline));
    for (key, value) in values {
        let body = match value {
            Value::String(s) => s.clone(),
            other => format!(
                "```json\n{}\n```",
                serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
            ),
        };
        out.push_str(&format!("\n## {}\n\n{body}\n", display_name(key)));
    }
    out
}

fn render_run(run: &RunSummary) -> String {
    let mut out = format!(
        "\n---\n\n## Pipeline Run\n\nRun `{}` of `{}` {} in {} ms with {} model call(s).\n\n| Stage | Status | Attempts | Duration (ms) | Model Calls |\n|-------|--------|----------|---------------|-------------|\n",
        run.run_id,
        run.pipeline,
        run.status,
        run.duration_ms,
        run.total_model_calls(),
    );
    for s in &run.stages {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            s.name, s.status, s.attempts, s.duration_ms, s.model_calls
        ));
    }
    let notes: Vec<String> = run
        .stages
        .iter()
        .flat_map(|s| {
            s.error
                .iter()
                .map(move |e| format!("{}: {e}", s.name))
                .chain(s.notes.iter().map(move |n| format!("{}: {n}", s.name)))
        })
        .collect();
    if !notes.is_empty() {
        out.push_str("\n**Notes:**\n");
        for note in notes {
            out.push_str(&format!("- {note}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::fixtures;
    use serde_json::json;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("net_income"), "Net Income");
        assert_eq!(display_name("cet1_ratio"), "Cet1 Ratio");
        assert_eq!(display_name("follow_up"), "Follow Up");
    }

    #[test]
    fn test_financial_markdown_sections() {
        let md = render_markdown(&fixtures::financial_report());
        assert!(md.starts_with("# Financial Analysis Report\n## Acme Bank Group"));
        assert!(md.contains("| Net Income | EUR 1.2B | +12% | FY2024 |"), "got: {md}");
        assert!(md.contains("## Balance Sheet Highlights"));
        assert!(md.contains("| Cet1 Ratio | 15.1% | > 13% | Meeting |"));
        assert!(md.contains("**Credit Quality:** Stable"));
        assert!(md.contains("2. Grow fee income"));
        assert!(md.contains("| analyze_financials | succeeded | 2 | 1200 | 2 |"));
        assert!(md.contains("- analyze_financials: first attempt timed out"));
        assert!(!md.contains("## Data Validation"));
    }

    #[test]
    fn test_generic_markdown() {
        let mut report = fixtures::financial_report();
        report.body = ReportBody::Generic(BTreeMap::from([
            ("outline".to_string(), json!("1. Intro")),
            ("facts".to_string(), json!({"a": 1})),
        ]));
        let md = render_markdown(&report);
        assert!(md.starts_with("# Financial Report Analyzer Report"));
        assert!(md.contains("## Outline\n\n1. Intro"));
        assert!(md.contains("```json"));
    }

    #[tokio::test]
    async fn test_markdown_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = MarkdownSink::new("markdown", dir.path().join("reports"));
        let path = sink
            .write(&fixtures::financial_report())
            .await
            .unwrap()
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Acme_Bank_Group_analysis_"), "got: {name}");
        assert!(name.ends_with(".md"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("## Executive Summary"));
    }
}

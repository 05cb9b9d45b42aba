//! LogSink - logs a report summary via tracing

use contracts::{AggregatedReport, ContractError, ReportBody, ReportSink};
use std::path::PathBuf;
use tracing::{info, instrument};

/// Sink that logs report summaries, writes no artifact
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_report_summary(&self, report: &AggregatedReport) {
        let (items, warnings) = match &report.body {
            ReportBody::Financial(r) => (
                r.analysis.key_metrics.len(),
                r.validation.as_ref().map_or(0, |v| v.warnings.len()),
            ),
            ReportBody::Referral(r) => (r.summary.matches_found, 0),
            ReportBody::Generic(values) => (values.len(), 0),
        };

        info!(
            sink = %self.name,
            run_id = %report.run.run_id,
            pipeline = %report.run.pipeline,
            subject = %report.subject(),
            status = %report.run.status,
            duration_ms = report.run.duration_ms,
            model_calls = report.run.total_model_calls(),
            items,
            warnings,
            "Report ready"
        );
    }
}

impl ReportSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, report),
        fields(sink = %self.name, run_id = %report.run.run_id)
    )]
    async fn write(&mut self, report: &AggregatedReport) -> Result<Option<PathBuf>, ContractError> {
        self.log_report_summary(report);
        Ok(None)
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}

//! JsonSink - writes reports as JSON with a metadata envelope

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{Local, Utc};
use contracts::{AggregatedReport, ContractError, ReportSink};
use serde_json::json;
use tracing::{debug, instrument};

use super::{output_dir_from_params, report_file_name, write_artifact};

/// Sink that writes one pretty-printed `.json` file per report
pub struct JsonSink {
    name: String,
    output_dir: PathBuf,
}

impl JsonSink {
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

    fn render(&self, report: &AggregatedReport) -> Result<String, ContractError> {
        let document = json!({
            "metadata": {
                "subject": report.subject(),
                "report_type": report.report_type(),
                "generated_at": Utc::now().to_rfc3339(),
                "run_id": report.run.run_id,
                "pipeline": report.run.pipeline,
                "status": report.run.status,
            },
            "report": report.body,
            "run": report.run,
        });
        serde_json::to_string_pretty(&document)
            .map_err(|e| ContractError::sink_write(&self.name, format!("serialize failed: {e}")))
    }
}

impl ReportSink for JsonSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "json_sink_write",
        skip(self, report),
        fields(sink = %self.name, run_id = %report.run.run_id)
    )]
    async fn write(&mut self, report: &AggregatedReport) -> Result<Option<PathBuf>, ContractError> {
        let contents = self.render(report)?;
        let file_name = report_file_name(report, "json", Local::now());
        let path = write_artifact(&self.name, &self.output_dir, file_name, contents).await?;
        debug!(path = %path.display(), "json report written");
        Ok(Some(path))
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

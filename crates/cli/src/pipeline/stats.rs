//! Run statistics printed after a pipeline finishes.

use std::path::PathBuf;
use std::time::Duration;

use contracts::{RunStatus, StageRecord, StageStatus};
use observability::RunMetricsAggregator;

use super::CompletedRun;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub run_id: String,
    pub pipeline: String,

    /// `None` when a stage failure aborted the run
    pub status: Option<RunStatus>,

    /// Total duration of the run, dispatch included
    pub duration: Duration,

    /// Per-stage execution records, in pipeline order
    pub records: Vec<StageRecord>,

    /// Report files written by the sinks
    pub artifacts: Vec<PathBuf>,

    /// Reports a sink dropped or failed to write
    pub sink_failures: u64,

    /// Stage metrics aggregator
    pub stage_metrics: RunMetricsAggregator,
}

impl RunStats {
    pub fn from_completed(run: &CompletedRun) -> Self {
        let mut stage_metrics = RunMetricsAggregator::new();
        stage_metrics.update(&run.outcome.records);
        Self {
            run_id: run.outcome.run_id.clone(),
            pipeline: run.outcome.pipeline.clone(),
            status: Some(run.outcome.status),
            duration: run.outcome.duration,
            records: run.outcome.records.clone(),
            artifacts: run.dispatch.artifacts.clone(),
            sink_failures: run.dispatch.failures() + run.dispatch.dropped(),
            stage_metrics,
        }
    }

    pub fn from_failure(
        run_id: &str,
        pipeline: &str,
        records: &[StageRecord],
        duration: Duration,
    ) -> Self {
        let mut stage_metrics = RunMetricsAggregator::new();
        stage_metrics.update(records);
        Self {
            run_id: run_id.to_string(),
            pipeline: pipeline.to_string(),
            status: None,
            duration,
            records: records.to_vec(),
            stage_metrics,
            ..Default::default()
        }
    }

    /// Count stages with the given status
    pub fn count(&self, status: StageStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        let summary = self.stage_metrics.summary();
        let status = self
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "failed".to_string());

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                      Run Statistics                          ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Run: {} ({})", self.run_id, self.pipeline);
        println!("   ├─ Status: {}", status);
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!(
            "   ├─ Stages: {} succeeded, {} failed, {} skipped",
            self.count(StageStatus::Succeeded),
            self.count(StageStatus::Failed),
            self.count(StageStatus::Skipped)
        );
        println!("   ├─ Retries: {}", summary.total_retries);
        println!("   └─ Model calls: {}", summary.total_model_calls);

        println!("\n🔗 Stages");
        for (i, record) in self.records.iter().enumerate() {
            let prefix = if i == self.records.len() - 1 { "└─" } else { "├─" };
            let mut line = format!(
                "   {} {} [{}] {} ms, {} attempt(s)",
                prefix, record.name, record.status, record.duration_ms, record.attempts
            );
            if let Some(ref error) = record.error {
                line.push_str(&format!(": {error}"));
            }
            println!("{line}");
            for note in &record.notes {
                println!("   {}    · {}", if i == self.records.len() - 1 { " " } else { "│" }, note);
            }
        }

        if !summary.stage_failures.is_empty() {
            println!("\n⚠️  Failed Stages");
            for (stage, count) in &summary.stage_failures {
                println!("   ├─ {}: {}", stage, count);
            }
        }

        if !self.artifacts.is_empty() {
            println!("\n📤 Reports ({})", self.artifacts.len());
            for (i, path) in self.artifacts.iter().enumerate() {
                let prefix = if i == self.artifacts.len() - 1 { "└─" } else { "├─" };
                println!("   {} {}", prefix, path.display());
            }
        }
        if self.sink_failures > 0 {
            println!("\n⚠️  {} sink write(s) failed or were dropped", self.sink_failures);
        }

        println!();
    }
}

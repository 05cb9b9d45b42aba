//! Shared run path: blueprint + seed in, report files out.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use contracts::{AggregatedReport, PipelineBlueprint, PipelineState};
use dispatcher::DispatchSummary;
use model_client::ProviderClient;
use orchestrator::{PipelineBuilder, PipelineOutcome};
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

use super::RunStats;
use crate::error::{CliError, Result};

/// Per-invocation options that are not part of the blueprint
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub api_key: Option<String>,
    /// Whole-run deadline
    pub timeout: Option<Duration>,
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct CompletedRun {
    pub outcome: PipelineOutcome,
    pub report: AggregatedReport,
    pub dispatch: DispatchSummary,
}

impl CompletedRun {
    pub fn stats(&self) -> RunStats {
        RunStats::from_completed(self)
    }
}

/// Build, run, aggregate and dispatch one pipeline
///
/// A fail-fast stage failure prints the stage table before the error is
/// returned, so the caller still sees how far the run got.
pub async fn execute(
    blueprint: &PipelineBlueprint,
    seed: PipelineState,
    options: &RunOptions,
) -> Result<CompletedRun> {
    config_loader::ConfigLoader::validate(blueprint)?;

    let client = Arc::new(ProviderClient::from_settings(
        &blueprint.model,
        options.api_key.clone(),
    )?);
    let stages = stages::build_stages(blueprint, client)?;
    let pipeline = PipelineBuilder::from_blueprint(blueprint, stages).build()?;

    let run_id = new_run_id();
    info!(
        run_id = %run_id,
        pipeline = pipeline.name(),
        stages = ?pipeline.stage_names(),
        "Starting pipeline"
    );

    let started = Instant::now();
    let outcome = match guarded(pipeline.run(&run_id, seed), options.timeout).await? {
        Ok(outcome) => outcome,
        Err(e) => {
            if !e.records().is_empty() {
                RunStats::from_failure(&run_id, pipeline.name(), e.records(), started.elapsed())
                    .print_summary();
            }
            return Err(e.into());
        }
    };

    let report = orchestrator::aggregate(blueprint.pipeline.kind, &outcome)?;

    let dispatch = if blueprint.sinks.is_empty() {
        warn!("No sinks configured, report is not written anywhere");
        DispatchSummary::default()
    } else {
        dispatcher::dispatch_report(blueprint.sinks.clone(), report.clone()).await?
    };

    if dispatch.failures() > 0 || dispatch.dropped() > 0 {
        error!(
            failures = dispatch.failures(),
            dropped = dispatch.dropped(),
            "Some sinks did not write the report"
        );
    }

    info!(
        run_id = %outcome.run_id,
        status = %outcome.status,
        artifacts = dispatch.artifacts.len(),
        "Pipeline completed"
    );

    Ok(CompletedRun {
        outcome,
        report,
        dispatch,
    })
}

/// Race `fut` against the deadline and the shutdown signal
///
/// Losing the race drops `fut`, which cancels the in-flight stage attempt.
async fn guarded<F: Future>(fut: F, timeout: Option<Duration>) -> Result<F::Output> {
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        output = fut => Ok(output),
        _ = deadline => {
            let secs = timeout.map(|t| t.as_secs()).unwrap_or_default();
            warn!(secs, "Run deadline reached, cancelling");
            Err(CliError::TimedOut { secs })
        }
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, cancelling run...");
            Err(CliError::Interrupted)
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn new_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%d%H%M%S%3f"))
}

/// Read and deserialize a JSON input file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| CliError::input(&display, e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| CliError::input(&display, e.to_string()))
}

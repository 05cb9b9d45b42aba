//! `analyze` command implementation.

use anyhow::{Context, Result};
use contracts::{AnalysisRequest, PipelineBlueprint, PipelineState, ReportBody};
use tracing::info;

use super::apply_overrides;
use crate::cli::AnalyzeArgs;
use crate::pipeline::{execute, RunOptions};

/// Execute the `analyze` command
pub async fn run_analyze(args: &AnalyzeArgs, options: RunOptions) -> Result<()> {
    info!(
        company = %args.company,
        images = args.images.len(),
        metrics = args.metrics.len(),
        "Analyzing financial report"
    );

    let mut blueprint = PipelineBlueprint::financial_default(!args.metrics.is_empty());
    apply_overrides(&mut blueprint, &args.model, &args.output);

    let mut request = AnalysisRequest::new(&args.company, args.images.clone());
    request.custom_prompt = args.prompt.clone();
    request.metrics = args.metrics.clone();

    let mut seed = PipelineState::new();
    seed.insert_typed("request", &request)?;

    let options = RunOptions {
        api_key: args.model.api_key.clone().or(options.api_key),
        ..options
    };
    let run = execute(&blueprint, seed, &options)
        .await
        .context("Financial analysis failed")?;

    run.stats().print_summary();

    if let ReportBody::Financial(ref report) = run.report.body {
        if let Some(ref summary) = report.analysis.executive_summary {
            println!("Executive summary:\n  {summary}\n");
        }
        if let Some(ref validation) = report.validation {
            for warning in &validation.warnings {
                println!("⚠ {warning}");
            }
        }
    }

    if !args.metrics.is_empty() {
        match run.outcome.state.get_raw("metrics") {
            Some(metrics) => {
                let json = serde_json::to_string_pretty(metrics)
                    .context("Failed to serialize extracted metrics")?;
                println!("{json}");
            }
            None => println!("No metrics were extracted"),
        }
    }

    Ok(())
}

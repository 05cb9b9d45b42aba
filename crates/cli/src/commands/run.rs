//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{PipelineBlueprint, PipelineState};
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{execute, read_json, RunOptions};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs, options: RunOptions) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let seed: PipelineState = read_json(&args.input)?;

    info!(
        pipeline = %blueprint.pipeline.name,
        kind = ?blueprint.pipeline.kind,
        provider = %blueprint.model.provider,
        stages = blueprint.stages.len(),
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    let missing: Vec<String> = blueprint
        .seed_keys()
        .into_iter()
        .filter(|k| !seed.contains(k))
        .collect();

    // Dry run - just validate and exit
    if args.dry_run {
        print_config_summary(&blueprint, &seed);
        if !missing.is_empty() {
            anyhow::bail!("Input is missing seed values: {}", missing.join(", "));
        }
        info!("Dry run mode - configuration and input are valid, exiting");
        return Ok(());
    }

    let options = RunOptions {
        api_key: args.api_key.clone().or(options.api_key),
        ..options
    };
    let run = execute(&blueprint, seed, &options)
        .await
        .context("Pipeline execution failed")?;

    run.stats().print_summary();

    info!("aipipe finished");
    Ok(())
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &PipelineBlueprint, seed: &PipelineState) {
    println!("\n=== Configuration Summary ===\n");
    println!("Pipeline: {} ({:?})", blueprint.pipeline.name, blueprint.pipeline.kind);
    println!(
        "Model: {} / {}",
        blueprint.model.provider,
        blueprint.model.model_name()
    );
    println!(
        "Retry: {} attempt(s), {} ms initial backoff",
        blueprint.retry.max_attempts, blueprint.retry.initial_backoff_ms
    );

    println!("\nSeeds:");
    for key in blueprint.seed_keys() {
        let mark = if seed.contains(&key) { "✓" } else { "✗" };
        println!("  {} {}", mark, key);
    }

    println!("\nStages ({}):", blueprint.stages.len());
    for stage in &blueprint.stages {
        let d = stage.descriptor();
        println!(
            "  - {} ({:?}): [{}] -> {}",
            d.name,
            stage.kind,
            d.requires.join(", "),
            d.produces
        );
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({})", sink.name, sink.sink_type.as_str());
        }
    }

    println!();
}

//! `validate` command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use contracts::{PipelineBlueprint, StageKind};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    pipeline: String,
    kind: String,
    provider: String,
    seeds: Vec<String>,
    stage_count: usize,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(&args.config);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(path: &Path) -> ValidationResult {
    let config_path = path.display().to_string();

    if !path.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", path.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(path) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    pipeline: blueprint.pipeline.name.clone(),
                    kind: format!("{:?}", blueprint.pipeline.kind),
                    provider: blueprint.model.provider.to_string(),
                    seeds: blueprint.seed_keys(),
                    stage_count: blueprint.stages.len(),
                    sink_count: blueprint.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &PipelineBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - reports will not be written".to_string());
    }

    if !model_client::api_key_present(&blueprint.model) {
        if let Some(var) = blueprint.model.api_key_env_name() {
            warnings.push(format!(
                "{} is not set - {} calls will fail without --api-key",
                var, blueprint.model.provider
            ));
        }
    }

    if blueprint.retry.max_attempts == 1 {
        warnings.push(
            "retry.max_attempts is 1 - transient model errors will fail the stage".to_string(),
        );
    }

    for stage in &blueprint.stages {
        if stage.kind == StageKind::GenerateMessages && stage.param_u64("max_recipients") == Some(0) {
            warnings.push(format!(
                "Stage '{}' has max_recipients = 0 and will draft no messages",
                stage.name
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Pipeline: {} ({})", summary.pipeline, summary.kind);
            println!("  Provider: {}", summary.provider);
            println!("  Seeds: {}", summary.seeds.join(", "));
            println!("  Stages: {}", summary.stage_count);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::PipelineBlueprint;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    pipeline: PipelineInfo,
    model: ModelInfo,
    retry: RetryInfo,
    stages: Vec<StageInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct PipelineInfo {
    name: String,
    kind: String,
    seeds: Vec<String>,
    failure_mode: String,
    stage_timeout_secs: u64,
}

#[derive(Serialize)]
struct ModelInfo {
    provider: String,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key_env: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct RetryInfo {
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    multiplier: f64,
    jitter: bool,
}

#[derive(Serialize)]
struct StageInfo {
    name: String,
    kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    requires: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    produces: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, Value>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dir: Option<String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &PipelineBlueprint, args: &InfoArgs) -> ConfigInfo {
    let stages = blueprint
        .stages
        .iter()
        .map(|s| {
            let d = s.descriptor();
            if args.stages {
                StageInfo {
                    name: d.name,
                    kind: format!("{:?}", s.kind),
                    requires: d.requires,
                    produces: d.produces,
                    max_attempts: s.retry.as_ref().map(|r| r.max_attempts),
                    timeout_secs: s.timeout_secs,
                    params: s.params.clone(),
                }
            } else {
                StageInfo {
                    name: d.name,
                    kind: format!("{:?}", s.kind),
                    requires: Vec::new(),
                    produces: String::new(),
                    max_attempts: None,
                    timeout_secs: None,
                    params: BTreeMap::new(),
                }
            }
        })
        .collect();

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: s.sink_type.as_str().to_string(),
                queue_capacity: s.queue_capacity,
                output_dir: s.params.get("output_dir").cloned(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        pipeline: PipelineInfo {
            name: blueprint.pipeline.name.clone(),
            kind: format!("{:?}", blueprint.pipeline.kind),
            seeds: blueprint.seed_keys(),
            failure_mode: format!("{:?}", blueprint.failure_mode),
            stage_timeout_secs: blueprint.stage_timeout_secs,
        },
        model: ModelInfo {
            provider: blueprint.model.provider.to_string(),
            model: blueprint.model.model_name().to_string(),
            api_key_env: blueprint.model.api_key_env_name().map(String::from),
            temperature: blueprint.model.temperature,
            max_tokens: blueprint.model.max_tokens,
        },
        retry: RetryInfo {
            max_attempts: blueprint.retry.max_attempts,
            initial_backoff_ms: blueprint.retry.initial_backoff_ms,
            max_backoff_ms: blueprint.retry.max_backoff_ms,
            multiplier: blueprint.retry.multiplier,
            jitter: blueprint.retry.jitter,
        },
        stages,
        sinks,
    }
}

fn print_config_info(blueprint: &PipelineBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                   aipipe Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📍 Pipeline");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Name: {}", blueprint.pipeline.name);
    println!("   ├─ Kind: {:?}", blueprint.pipeline.kind);
    println!("   ├─ Seeds: {}", blueprint.seed_keys().join(", "));
    println!("   ├─ On failure: {:?}", blueprint.failure_mode);
    println!("   └─ Stage timeout: {}s", blueprint.stage_timeout_secs);

    println!("\n🤖 Model");
    println!(
        "   ├─ Provider: {} ({})",
        blueprint.model.provider,
        blueprint.model.model_name()
    );
    match blueprint.model.api_key_env_name() {
        Some(var) => println!("   ├─ API key env: {}", var),
        None => println!("   ├─ API key env: (none)"),
    }
    println!(
        "   └─ Sampling: temperature {}, max {} tokens",
        blueprint.model.temperature, blueprint.model.max_tokens
    );

    let retry = &blueprint.retry;
    println!("\n⚙️  Retry");
    println!("   ├─ Attempts: {}", retry.max_attempts);
    println!(
        "   └─ Backoff: {} ms × {} up to {} ms{}",
        retry.initial_backoff_ms,
        retry.multiplier,
        retry.max_backoff_ms,
        if retry.jitter { " (jittered)" } else { "" }
    );

    println!("\n🔗 Stages ({})", blueprint.stages.len());
    for (i, stage) in blueprint.stages.iter().enumerate() {
        let is_last = i == blueprint.stages.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {} ({:?})", prefix, stage.name, stage.kind);

        if args.stages {
            let d = stage.descriptor();
            println!("   {}  ├─ requires: [{}]", child_prefix, d.requires.join(", "));
            if let Some(ref r) = stage.retry {
                println!("   {}  ├─ attempts: {}", child_prefix, r.max_attempts);
            }
            if let Some(secs) = stage.timeout_secs {
                println!("   {}  ├─ timeout: {}s", child_prefix, secs);
            }
            for (key, value) in &stage.params {
                println!("   {}  ├─ {}: {}", child_prefix, key, value);
            }
            println!("   {}  └─ produces: {}", child_prefix, d.produces);
        }
    }

    if args.sinks && !blueprint.sinks.is_empty() {
        println!("\n📤 Sinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let is_last = i == blueprint.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            let dir = sink
                .params
                .get("output_dir")
                .map(String::as_str)
                .unwrap_or(dispatcher::DEFAULT_OUTPUT_DIR);
            println!(
                "   {} {} ({}, queue {}) -> {}",
                prefix,
                sink.name,
                sink.sink_type.as_str(),
                sink.queue_capacity,
                dir
            );
        }
    }

    println!();
}

//! `check` command implementation.
//!
//! Reports what a run would need without making any model call. Always
//! exits 0; problems are listed, not raised.

use std::path::Path;

use anyhow::{Context, Result};
use contracts::{ModelProvider, ModelSettings, SinkType, StageKind};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::CheckArgs;

const STAGE_KINDS: [StageKind; 9] = [
    StageKind::LoadImages,
    StageKind::AnalyzeFinancials,
    StageKind::ExtractMetrics,
    StageKind::ValidateFinancials,
    StageKind::MineAlumni,
    StageKind::MatchDomains,
    StageKind::RecommendPaths,
    StageKind::GenerateMessages,
    StageKind::Prompt,
];

#[derive(Serialize)]
struct CheckReport {
    version: &'static str,
    providers: Vec<ProviderCheck>,
    output_dir: OutputDirCheck,
    stage_kinds: Vec<String>,
    sink_types: Vec<&'static str>,
}

#[derive(Serialize)]
struct ProviderCheck {
    provider: String,
    default_model: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key_env: Option<&'static str>,
    ready: bool,
}

#[derive(Serialize)]
struct OutputDirCheck {
    path: String,
    writable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Execute the `check` command
pub fn run_check(args: &CheckArgs) -> Result<()> {
    info!(output_dir = %args.output_dir.display(), "Checking environment");

    let report = CheckReport {
        version: env!("CARGO_PKG_VERSION"),
        providers: [ModelProvider::OpenAi, ModelProvider::Gemini, ModelProvider::Mock]
            .into_iter()
            .map(check_provider)
            .collect(),
        output_dir: check_output_dir(&args.output_dir),
        stage_kinds: STAGE_KINDS.iter().map(|k| format!("{k:?}")).collect(),
        sink_types: SinkType::ALL.iter().map(|t| t.as_str()).collect(),
    };

    if args.json {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize check report")?;
        println!("{}", json);
    } else {
        print_check_report(&report);
    }

    Ok(())
}

fn check_provider(provider: ModelProvider) -> ProviderCheck {
    let settings = ModelSettings {
        provider,
        ..ModelSettings::default()
    };
    ProviderCheck {
        provider: provider.to_string(),
        default_model: provider.default_model(),
        api_key_env: provider.default_api_key_env(),
        ready: model_client::api_key_present(&settings),
    }
}

fn check_output_dir(dir: &Path) -> OutputDirCheck {
    let probe = dir.join(format!(".aipipe-check-{}", std::process::id()));
    let result = std::fs::create_dir_all(dir)
        .and_then(|_| std::fs::write(&probe, b"ok"))
        .and_then(|_| std::fs::remove_file(&probe));
    debug!(probe = %probe.display(), ok = result.is_ok(), "output directory probed");

    OutputDirCheck {
        path: dir.display().to_string(),
        writable: result.is_ok(),
        error: result.err().map(|e| e.to_string()),
    }
}

fn print_check_report(report: &CheckReport) {
    println!("aipipe {}\n", report.version);

    println!("🤖 Providers");
    for (i, p) in report.providers.iter().enumerate() {
        let prefix = if i == report.providers.len() - 1 { "└─" } else { "├─" };
        let mark = if p.ready { "✓" } else { "✗" };
        match p.api_key_env {
            Some(var) if !p.ready => println!(
                "   {} {} {} ({}): set {}",
                prefix, mark, p.provider, p.default_model, var
            ),
            _ => println!("   {} {} {} ({})", prefix, mark, p.provider, p.default_model),
        }
    }

    println!("\n📁 Output directory");
    let out = &report.output_dir;
    if out.writable {
        println!("   └─ ✓ {} is writable", out.path);
    } else {
        println!(
            "   └─ ✗ {}: {}",
            out.path,
            out.error.as_deref().unwrap_or("not writable")
        );
    }

    println!("\n🧩 Components");
    println!("   ├─ Stages: {}", report.stage_kinds.join(", "));
    println!("   └─ Sinks: {}", report.sink_types.join(", "));
    println!();
}

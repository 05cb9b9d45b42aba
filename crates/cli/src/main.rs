//! # aipipe CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 财报分析与校友内推两条内置管道
//! - 配置文件驱动的通用管道运行、校验与查看
//! - 环境检查
//! - 优雅关闭处理

mod cli;
mod commands;
mod error;
mod pipeline;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_analyze, run_check, run_info, run_pipeline, run_refer, run_validate};
use pipeline::RunOptions;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(observability_config(&cli))?;

    info!(version = env!("CARGO_PKG_VERSION"), "aipipe starting");

    let options = RunOptions {
        api_key: None,
        timeout: (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout)),
    };

    let result = match &cli.command {
        Commands::Analyze(args) => run_analyze(args, options).await,
        Commands::Refer(args) => run_refer(args, options).await,
        Commands::Run(args) => run_pipeline(args, options).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
        Commands::Check(args) => run_check(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Map CLI verbosity flags onto the tracing setup
fn observability_config(cli: &Cli) -> ObservabilityConfig {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: cli.metrics_port,
        default_log_level: default_log_level.to_string(),
        force_level: cli.quiet,
    }
}

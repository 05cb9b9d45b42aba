//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::{ModelProvider, SinkType};
use std::path::PathBuf;

/// aipipe - multi-stage model pipelines from the command line
#[derive(Parser, Debug)]
#[command(
    name = "aipipe",
    author,
    version,
    about = "Multi-stage AI pipeline orchestrator",
    long_about = "Runs ordered pipelines of model-backed stages.\n\n\
                  Each stage declares the keys it reads and the key it writes; \n\
                  outputs flow forward, transient model failures are retried, \n\
                  and the final report is written to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "AIPIPE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "AIPIPE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Expose Prometheus metrics on this port
    #[arg(long, global = true, env = "AIPIPE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Abort a run after this many seconds (0 = no limit)
    #[arg(long, default_value = "0", global = true, env = "AIPIPE_TIMEOUT")]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze financial report images
    Analyze(AnalyzeArgs),

    /// Find alumni referral paths and draft outreach messages
    Refer(ReferArgs),

    /// Run a pipeline described by a configuration file
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// Check credentials, output directory and built-in components
    Check(CheckArgs),
}

/// Model options shared by the pipeline shortcuts
#[derive(Parser, Debug, Clone)]
pub struct ModelArgs {
    /// Model provider
    #[arg(long, value_enum, env = "AIPIPE_PROVIDER")]
    pub provider: Option<ProviderArg>,

    /// Model name (defaults per provider)
    #[arg(long, env = "AIPIPE_MODEL")]
    pub model: Option<String>,

    /// API key (otherwise read from the provider's environment variable)
    #[arg(long, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Attempts per stage before giving up
    #[arg(long, env = "AIPIPE_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,
}

/// Output options shared by the pipeline shortcuts
#[derive(Parser, Debug, Clone)]
pub struct OutputArgs {
    /// Report formats to write (markdown, json, summary, log)
    #[arg(
        short,
        long,
        value_delimiter = ',',
        num_args = 1..,
        default_value = "markdown",
        value_parser = parse_format
    )]
    pub formats: Vec<SinkType>,

    /// Directory for written reports
    #[arg(
        short,
        long,
        default_value = dispatcher::DEFAULT_OUTPUT_DIR,
        env = "AIPIPE_OUTPUT_DIR"
    )]
    pub output_dir: PathBuf,
}

/// Arguments for the `analyze` command
#[derive(Parser, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Report images (local paths or http(s) URLs)
    #[arg(required = true)]
    pub images: Vec<String>,

    /// Company the report belongs to
    #[arg(long, default_value = "Company")]
    pub company: String,

    /// Specific metrics to extract; adds the metric extraction stage
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub metrics: Vec<String>,

    /// Replace the built-in analysis prompt
    #[arg(long)]
    pub prompt: Option<String>,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Arguments for the `refer` command
#[derive(Parser, Debug, Clone)]
pub struct ReferArgs {
    /// Student profile (JSON file)
    #[arg(long)]
    pub student: PathBuf,

    /// Alumni roster (JSON array); the model is asked for alumni when absent
    #[arg(long)]
    pub alumni: Option<PathBuf>,

    /// Only consider alumni at these companies
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub companies: Vec<String>,

    /// Only consider these graduation years
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub years: Vec<i32>,

    /// Only consider alumni whose role contains one of these
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub roles: Vec<String>,

    /// Only consider alumni sharing one of these skills
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub skills: Vec<String>,

    /// Number of top paths to draft messages for
    #[arg(long, default_value = "1")]
    pub recipients: u64,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to pipeline configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "pipeline.toml",
        env = "AIPIPE_CONFIG"
    )]
    pub config: PathBuf,

    /// Seed values (JSON object keyed by seed name)
    #[arg(short, long)]
    pub input: PathBuf,

    /// API key (otherwise read from the provider's environment variable)
    #[arg(long, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Validate configuration and seeds, then exit without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "pipeline.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "pipeline.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show per-stage contract details
    #[arg(long)]
    pub stages: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Arguments for the `check` command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Directory to test for writability
    #[arg(short, long, default_value = dispatcher::DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

/// Model provider choice
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ProviderArg {
    Openai,
    Gemini,
    Mock,
}

impl From<ProviderArg> for ModelProvider {
    fn from(provider: ProviderArg) -> Self {
        match provider {
            ProviderArg::Openai => Self::OpenAi,
            ProviderArg::Gemini => Self::Gemini,
            ProviderArg::Mock => Self::Mock,
        }
    }
}

fn parse_format(value: &str) -> Result<SinkType, String> {
    SinkType::from_name(value).ok_or_else(|| {
        let known: Vec<_> = SinkType::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown format '{value}' (expected one of: {})", known.join(", "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_defaults() {
        let cli = Cli::try_parse_from(["aipipe", "analyze", "page1.png", "page2.png"]).unwrap();
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.images, vec!["page1.png", "page2.png"]);
        assert_eq!(args.company, "Company");
        assert_eq!(args.output.formats, vec![SinkType::Markdown]);
        assert!(args.model.provider.is_none());
        assert_eq!(cli.timeout, 0);
    }

    #[test]
    fn test_formats_comma_separated() {
        let cli = Cli::try_parse_from([
            "aipipe", "analyze", "a.png", "--formats", "json,summary", "--provider", "mock",
        ])
        .unwrap();
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.output.formats, vec![SinkType::Json, SinkType::Summary]);
        assert!(matches!(args.model.provider, Some(ProviderArg::Mock)));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = Cli::try_parse_from(["aipipe", "analyze", "a.png", "--formats", "excel"])
            .unwrap_err();
        assert!(err.to_string().contains("unknown format 'excel'"));
    }

    #[test]
    fn test_analyze_requires_images() {
        assert!(Cli::try_parse_from(["aipipe", "analyze"]).is_err());
    }

    #[test]
    fn test_refer_filters() {
        let cli = Cli::try_parse_from([
            "aipipe", "refer", "--student", "me.json", "--companies", "Google,Meta", "--years",
            "2019,2020", "-q",
        ])
        .unwrap();
        assert!(cli.quiet);
        let Commands::Refer(args) = cli.command else {
            panic!("expected refer");
        };
        assert_eq!(args.companies, vec!["Google", "Meta"]);
        assert_eq!(args.years, vec![2019, 2020]);
        assert!(args.alumni.is_none());
    }
}

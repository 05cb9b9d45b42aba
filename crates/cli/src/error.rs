//! Error types for CLI operations.

use contracts::ContractError;
use dispatcher::DispatcherError;
use orchestrator::OrchestratorError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Seed or profile file could not be read or parsed
    #[error("Failed to read input {path}: {message}")]
    Input { path: String, message: String },

    /// The run exceeded `--timeout`
    #[error("Run timed out after {secs}s")]
    TimedOut { secs: u64 },

    /// Ctrl-C or SIGTERM arrived mid-run
    #[error("Run interrupted by shutdown signal")]
    Interrupted,

    /// Pipeline construction or execution error
    #[error(transparent)]
    Pipeline(#[from] OrchestratorError),

    /// Contract, configuration or model error
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// Report dispatch error
    #[error(transparent)]
    Dispatch(#[from] DispatcherError),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn input(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Input {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

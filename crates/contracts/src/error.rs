//! Layered error definitions
//!
//! Categorized by source: config / model / stage / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Model Errors =====
    /// Transport failure or 5xx from the model endpoint
    #[error("model request to '{provider}' failed: {message}")]
    ModelRequest { provider: String, message: String },

    /// Provider throttled the request
    #[error("model '{provider}' rate limited (retry after {retry_after_ms:?} ms)")]
    ModelRateLimited {
        provider: String,
        retry_after_ms: Option<u64>,
    },

    /// Missing or rejected credentials
    #[error("model '{provider}' authentication failed: {message}")]
    ModelAuth { provider: String, message: String },

    /// Request rejected as malformed (4xx other than auth / throttling)
    #[error("model '{provider}' rejected request: {message}")]
    ModelRejected { provider: String, message: String },

    /// Response arrived but could not be used
    #[error("model '{provider}' returned unusable response: {message}")]
    ModelResponse { provider: String, message: String },

    // ===== Stage Errors =====
    /// Stage attempt exceeded its time budget
    #[error("stage '{stage}' timed out after {waited_ms}ms")]
    Timeout { stage: String, waited_ms: u64 },

    /// Required input missing or malformed
    #[error("stage '{stage}' input '{key}' invalid: {message}")]
    StageInput {
        stage: String,
        key: String,
        message: String,
    },

    /// Stage could not produce its output
    #[error("stage '{stage}' output error: {message}")]
    StageOutput { stage: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn model_request(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelRequest {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn model_auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelAuth {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn model_rejected(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelRejected {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn model_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create stage input error
    pub fn stage_input(
        stage: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::StageInput {
            stage: stage.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create stage output error
    pub fn stage_output(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageOutput {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// Transient transport, throttling, garbled responses and timeouts retry;
    /// configuration, auth, rejected requests and input errors do not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ModelRequest { .. }
                | Self::ModelRateLimited { .. }
                | Self::ModelResponse { .. }
                | Self::Timeout { .. }
        )
    }

    /// The error came back from a model call, so the call itself happened.
    /// Timeouts are excluded: the stage may not have been waiting on a model.
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            Self::ModelRequest { .. }
                | Self::ModelRateLimited { .. }
                | Self::ModelAuth { .. }
                | Self::ModelRejected { .. }
                | Self::ModelResponse { .. }
        )
    }

    /// Server-provided retry hint, if any
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::ModelRateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

//! Runtime provider selection

use std::time::{Duration, Instant};

use contracts::{ContractError, ModelClient, ModelProvider, ModelRequest, ModelResponse, ModelSettings};
use tracing::{info, warn};

use crate::gemini::GeminiClient;
use crate::mock::MockModelClient;
use crate::openai::OpenAiClient;

/// Any supported client, chosen from configuration
#[derive(Debug)]
pub enum ProviderClient {
    OpenAi(OpenAiClient),
    Gemini(GeminiClient),
    Mock(MockModelClient),
}

impl ProviderClient {
    /// Build the configured client
    ///
    /// `api_key` takes precedence over the environment variable named by
    /// the settings.
    ///
    /// # Errors
    /// `ModelAuth` when a hosted provider has no key.
    pub fn from_settings(
        settings: &ModelSettings,
        api_key: Option<String>,
    ) -> Result<Self, ContractError> {
        let timeout = Duration::from_secs(settings.request_timeout_secs);
        let model = settings.model_name().to_string();

        let client = match settings.provider {
            ModelProvider::Mock => Self::Mock(MockModelClient::new()),
            ModelProvider::OpenAi => {
                let key = resolve_api_key(settings, api_key)?;
                Self::OpenAi(OpenAiClient::new(key, model, settings.base_url.clone(), timeout)?)
            }
            ModelProvider::Gemini => {
                let key = resolve_api_key(settings, api_key)?;
                Self::Gemini(GeminiClient::new(key, model, settings.base_url.clone(), timeout)?)
            }
        };

        info!(
            provider = %client.provider(),
            model = client.model(),
            "Model client configured"
        );
        Ok(client)
    }
}

/// Whether credentials for the configured provider are present
pub fn api_key_present(settings: &ModelSettings) -> bool {
    match settings.api_key_env_name() {
        None => true,
        Some(var) => std::env::var(var).is_ok_and(|v| !v.trim().is_empty()),
    }
}

fn resolve_api_key(
    settings: &ModelSettings,
    explicit: Option<String>,
) -> Result<String, ContractError> {
    if let Some(key) = explicit.filter(|k| !k.trim().is_empty()) {
        return Ok(key);
    }
    let var = settings.api_key_env_name().unwrap_or_default();
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ContractError::model_auth(
            settings.provider.as_str(),
            format!("missing API key: set {var} or pass --api-key"),
        )),
    }
}

impl ModelClient for ProviderClient {
    fn provider(&self) -> ModelProvider {
        match self {
            Self::OpenAi(c) => c.provider(),
            Self::Gemini(c) => c.provider(),
            Self::Mock(c) => c.provider(),
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::OpenAi(c) => c.model(),
            Self::Gemini(c) => c.model(),
            Self::Mock(c) => c.model(),
        }
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ContractError> {
        let started = Instant::now();
        let result = match self {
            Self::OpenAi(c) => c.generate(request).await,
            Self::Gemini(c) => c.generate(request).await,
            Self::Mock(c) => c.generate(request).await,
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let provider = self.provider();

        match &result {
            Ok(_) => observability::record_model_call(provider.as_str(), "success", latency_ms),
            Err(e) => {
                let outcome = if e.is_retryable() { "retryable_error" } else { "error" };
                observability::record_model_call(provider.as_str(), outcome, latency_ms);
                warn!(provider = %provider, error = %e, "Model call failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_needs_no_key() {
        let settings = ModelSettings {
            provider: ModelProvider::Mock,
            ..Default::default()
        };
        let client = ProviderClient::from_settings(&settings, None).unwrap();
        assert_eq!(client.provider(), ModelProvider::Mock);
        assert!(api_key_present(&settings));
    }

    #[test]
    fn test_missing_key_is_auth_error() {
        let settings = ModelSettings {
            provider: ModelProvider::OpenAi,
            api_key_env: Some("AIPIPE_TEST_KEY_THAT_IS_NEVER_SET".into()),
            ..Default::default()
        };
        let err = ProviderClient::from_settings(&settings, None).unwrap_err();
        assert!(matches!(err, ContractError::ModelAuth { .. }));
        assert!(err.to_string().contains("AIPIPE_TEST_KEY_THAT_IS_NEVER_SET"));
        assert!(!api_key_present(&settings));
    }

    #[test]
    fn test_explicit_key_wins() {
        let settings = ModelSettings {
            provider: ModelProvider::Gemini,
            api_key_env: Some("AIPIPE_TEST_KEY_THAT_IS_NEVER_SET".into()),
            ..Default::default()
        };
        let client = ProviderClient::from_settings(&settings, Some("abc".into())).unwrap();
        assert_eq!(client.model(), "gemini-1.5-flash");
    }

    #[tokio::test]
    async fn test_dispatches_to_mock() {
        let client = ProviderClient::Mock(MockModelClient::new().with_default_reply("hi"));
        let resp = client.generate(&ModelRequest::new("x")).await.unwrap();
        assert_eq!(resp.text, "hi");
    }
}

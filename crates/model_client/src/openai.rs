//! OpenAI-compatible chat-completions client (vision capable)

use std::time::Duration;

use contracts::{ContractError, ModelClient, ModelProvider, ModelRequest, ModelResponse, TokenUsage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::http::{build_http_client, check_status, transport_error};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "openai";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ContractError> {
        Ok(Self {
            http: build_http_client(timeout)?,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn build_body(&self, request: &ModelRequest) -> ChatRequest {
        let mut content = vec![json!({ "type": "text", "text": request.prompt })];
        content.extend(request.images.iter().map(|img| {
            json!({
                "type": "image_url",
                "image_url": { "url": img.data_url(), "detail": "high" }
            })
        }));

        let mut messages = Vec::with_capacity(2);
        if let Some(ctx) = request.context.as_deref().filter(|c| !c.is_empty()) {
            messages.push(json!({ "role": "system", "content": ctx }));
        }
        messages.push(json!({ "role": "user", "content": content }));

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ModelClient for OpenAiClient {
    fn provider(&self) -> ModelProvider {
        ModelProvider::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(
        name = "openai_generate",
        skip(self, request),
        fields(model = %self.model, images = request.images.len())
    )]
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ContractError> {
        let body = self.build_body(request);
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let response = check_status(PROVIDER, response).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ContractError::model_response(PROVIDER, format!("invalid body: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ContractError::model_response(PROVIDER, "empty completion"))?;

        debug!(chars = text.len(), "Completion received");

        Ok(ModelResponse {
            text,
            provider: ModelProvider::OpenAi,
            model: self.model.clone(),
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ImageInput;

    fn client() -> OpenAiClient {
        OpenAiClient::new("k", "gpt-4o", Some("http://localhost:1/v1/".into()), Duration::from_secs(1))
            .unwrap()
    }

    #[test]
    fn test_body_shape_with_images() {
        let req = ModelRequest::new("Analyze")
            .with_context("You are a financial analyst.")
            .with_images(vec![ImageInput::png(vec![0u8; 4])])
            .with_sampling(0.1, 4000);
        let body = serde_json::to_value(client().build_body(&req)).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 4000);
        assert_eq!(body["messages"][0]["role"], "system");
        let content = &body["messages"][1]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["image_url"]["detail"], "high");
        assert!(content[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(client().base_url, "http://localhost:1/v1");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_retryable() {
        let err = client().generate(&ModelRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, ContractError::ModelRequest { .. }), "got: {err}");
        assert!(err.is_retryable());
    }
}

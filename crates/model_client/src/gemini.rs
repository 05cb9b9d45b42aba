//! Google Gemini `generateContent` client

use std::time::Duration;

use contracts::{ContractError, ModelClient, ModelProvider, ModelRequest, ModelResponse, TokenUsage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::http::{build_http_client, check_status, transport_error};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER: &str = "gemini";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
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
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_body(&self, request: &ModelRequest) -> GenerateRequest {
        let mut parts = vec![json!({ "text": request.full_prompt() })];
        parts.extend(request.images.iter().map(|img| {
            json!({
                "inline_data": { "mime_type": img.mime_type, "data": img.to_base64() }
            })
        }));

        GenerateRequest {
            contents: vec![json!({ "role": "user", "parts": parts })],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                response_mime_type: request
                    .expect_json
                    .then(|| "application/json".to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Value>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

fn candidate_text(response: GenerateResponse) -> Result<(String, Option<TokenUsage>), ContractError> {
    let usage = response.usage_metadata.map(|u| TokenUsage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
    });
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ContractError::model_response(PROVIDER, "no candidates returned"))?;

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(ContractError::model_rejected(
            PROVIDER,
            "response blocked by safety filter",
        ));
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ContractError::model_response(PROVIDER, "empty candidate"));
    }
    Ok((text, usage))
}

impl ModelClient for GeminiClient {
    fn provider(&self) -> ModelProvider {
        ModelProvider::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(
        name = "gemini_generate",
        skip(self, request),
        fields(model = %self.model, images = request.images.len())
    )]
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ContractError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let response = check_status(PROVIDER, response).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ContractError::model_response(PROVIDER, format!("invalid body: {e}")))?;

        let (text, usage) = candidate_text(parsed)?;
        debug!(chars = text.len(), "Candidate received");

        Ok(ModelResponse {
            text,
            provider: ModelProvider::Gemini,
            model: self.model.clone(),
            usage,
        })
    }
}

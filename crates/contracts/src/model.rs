//! Hosted model contract
//!
//! Stages talk to a model only through [`ModelClient`]; provider specifics
//! (HTTP shape, auth, status mapping) live in the `model_client` crate.

use std::fmt;

use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Model provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    #[default]
    OpenAi,
    Gemini,
    Mock,
}

impl ModelProvider {
    /// Environment variable conventionally holding the API key
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Gemini => Some("GOOGLE_API_KEY"),
            Self::Mock => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Gemini => "gemini-1.5-flash",
            Self::Mock => "mock",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image attached to a vision request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInput {
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
}

impl ImageInput {
    pub fn png(data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: "image/png".to_string(),
            data: data.into(),
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// `data:` URL form used by OpenAI-compatible endpoints
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// A single generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub prompt: String,
    /// Optional framing placed before the prompt
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageInput>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Caller will parse the reply as JSON
    #[serde(default)]
    pub expect_json: bool,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: None,
            images: Vec::new(),
            temperature: 0.1,
            max_tokens: 4000,
            expect_json: false,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_images(mut self, images: Vec<ImageInput>) -> Self {
        self.images = images;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn expecting_json(mut self) -> Self {
        self.expect_json = true;
        self
    }

    /// Context and prompt joined the way single-message providers expect
    pub fn full_prompt(&self) -> String {
        match &self.context {
            Some(ctx) if !ctx.is_empty() => format!("{ctx}\n\n{}", self.prompt),
            _ => self.prompt.clone(),
        }
    }
}

/// Token accounting as reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub text: String,
    pub provider: ModelProvider,
    pub model: String,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// Hosted model client
#[trait_variant::make(ModelClient: Send)]
pub trait LocalModelClient {
    fn provider(&self) -> ModelProvider;

    /// Model identifier (for logging/metrics)
    fn model(&self) -> &str;

    /// Issue one generation request
    ///
    /// # Errors
    /// Mapped into the `Model*` variants of [`ContractError`] so the
    /// orchestrator can classify them.
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ContractError>;
}

mod base64_bytes {
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_prompt_places_context_first() {
        let req = ModelRequest::new("Summarize").with_context("You are an analyst.");
        assert_eq!(req.full_prompt(), "You are an analyst.\n\nSummarize");
        assert_eq!(ModelRequest::new("x").full_prompt(), "x");
    }

    #[test]
    fn test_data_url() {
        let img = ImageInput::png(vec![1u8, 2, 3]);
        assert_eq!(img.data_url(), "data:image/png;base64,AQID");
    }

    #[test]
    fn test_image_serializes_as_base64() {
        let img = ImageInput::png(vec![1u8, 2, 3]);
        let v = serde_json::to_value(&img).unwrap();
        assert_eq!(v["data"], "AQID");
        let back: ImageInput = serde_json::from_value(v).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn test_provider_defaults() {
        assert_eq!(ModelProvider::Gemini.default_api_key_env(), Some("GOOGLE_API_KEY"));
        assert_eq!(ModelProvider::Mock.default_api_key_env(), None);
        assert_eq!(ModelProvider::OpenAi.to_string(), "openai");
    }
}

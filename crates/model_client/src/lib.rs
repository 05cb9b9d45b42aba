//! # Model Client
//!
//! Hosted model access for pipeline stages.
//!
//! - [`OpenAiClient`]: chat-completions with image parts
//! - [`GeminiClient`]: `generateContent` with inline image data
//! - [`MockModelClient`]: scripted replies and injected failures
//! - [`ProviderClient`]: one of the above, chosen from `ModelSettings`
//!
//! HTTP status codes are mapped into `ContractError` so the orchestrator
//! can tell retryable failures (429, 5xx, transport) from permanent ones.

mod gemini;
mod http;
mod mock;
mod openai;
mod parse;
mod provider;

pub use contracts::{ModelClient, ModelRequest, ModelResponse};
pub use gemini::{GeminiClient, DEFAULT_GEMINI_BASE_URL};
pub use mock::{MockConfig, MockFailure, MockModelClient, Responder};
pub use openai::{OpenAiClient, DEFAULT_OPENAI_BASE_URL};
pub use parse::{extract_json, parse_structured};
pub use provider::{api_key_present, ProviderClient};

//! Mock model client
//!
//! Scriptable stand-in for hosted providers, supporting injected failures.
//! Replies are taken, in order, from: the script queue, the responder
//! closure, the default reply.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{ContractError, ModelClient, ModelProvider, ModelRequest, ModelResponse};
use tracing::{debug, instrument};

const PROVIDER: &str = "mock";

/// Reply generator
pub type Responder = Arc<dyn Fn(&ModelRequest) -> String + Send + Sync>;

/// Injected failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockFailure {
    /// Retryable transport error
    #[default]
    Transient,
    /// Retryable throttling with a retry-after hint
    RateLimited { retry_after_ms: u64 },
    /// Non-retryable rejection
    Permanent,
}

/// Mock 客户端配置
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Fail this many calls before succeeding
    pub fail_times: u32,
    pub failure: MockFailure,
    /// Delay before every reply
    pub latency: Duration,
}

pub struct MockModelClient {
    config: MockConfig,
    script: Mutex<VecDeque<String>>,
    responder: Option<Responder>,
    default_reply: String,
    failures_left: AtomicU32,
    calls: AtomicU32,
    requests: Mutex<Vec<ModelRequest>>,
}

impl fmt::Debug for MockModelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockModelClient")
            .field("config", &self.config)
            .field("calls", &self.call_count())
            .finish()
    }
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            failures_left: AtomicU32::new(config.fail_times),
            config,
            script: Mutex::new(VecDeque::new()),
            responder: None,
            default_reply: "{}".to_string(),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue replies returned in order
    pub fn with_script<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.script).extend(replies.into_iter().map(Into::into));
        self
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ModelRequest) -> String + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Total `generate` calls, failed ones included
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests that reached the reply stage (failed calls excluded)
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock(&self.requests).clone()
    }

    fn take_failure(&self) -> Option<ContractError> {
        let took = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !took {
            return None;
        }
        Some(match self.config.failure {
            MockFailure::Transient => {
                ContractError::model_request(PROVIDER, "injected transient failure")
            }
            MockFailure::RateLimited { retry_after_ms } => ContractError::ModelRateLimited {
                provider: PROVIDER.to_string(),
                retry_after_ms: Some(retry_after_ms),
            },
            MockFailure::Permanent => {
                ContractError::model_rejected(PROVIDER, "injected permanent failure")
            }
        })
    }

    fn reply_for(&self, request: &ModelRequest) -> String {
        if let Some(scripted) = lock(&self.script).pop_front() {
            return scripted;
        }
        match &self.responder {
            Some(responder) => responder(request),
            None => self.default_reply.clone(),
        }
    }
}

impl Default for MockModelClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelClient for MockModelClient {
    fn provider(&self) -> ModelProvider {
        ModelProvider::Mock
    }

    fn model(&self) -> &str {
        "mock"
    }

    #[instrument(name = "mock_generate", skip(self, request))]
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ContractError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        if let Some(err) = self.take_failure() {
            debug!(call, error = %err, "Injected failure");
            return Err(err);
        }

        lock(&self.requests).push(request.clone());
        let text = self.reply_for(request);
        if text.trim().is_empty() {
            return Err(ContractError::model_response(PROVIDER, "empty reply"));
        }

        Ok(ModelResponse {
            text,
            provider: ModelProvider::Mock,
            model: "mock".to_string(),
            usage: None,
        })
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

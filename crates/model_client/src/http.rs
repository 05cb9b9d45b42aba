//! HTTP plumbing shared by the hosted providers

use std::time::Duration;

use contracts::ContractError;
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};

/// Longest error body echoed back into an error message
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ContractError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ContractError::Other(format!("failed to create HTTP client: {e}")))
}

/// Map a transport failure
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> ContractError {
    if err.is_timeout() {
        ContractError::model_request(provider, format!("request timed out: {err}"))
    } else {
        ContractError::model_request(provider, err.to_string())
    }
}

/// Pass successful responses through, map the rest by status
pub(crate) async fn check_status(provider: &str, response: Response) -> Result<Response, ContractError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_ms = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();

    Err(map_status(provider, status, retry_after_ms, &body))
}

/// `Retry-After` in delta-seconds form, as milliseconds
fn parse_retry_after(value: &str) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

pub(crate) fn map_status(
    provider: &str,
    status: StatusCode,
    retry_after_ms: Option<u64>,
    body: &str,
) -> ContractError {
    let detail = format!("HTTP {status}: {}", truncate(body));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ContractError::model_auth(provider, detail)
        }
        StatusCode::TOO_MANY_REQUESTS => ContractError::ModelRateLimited {
            provider: provider.to_string(),
            retry_after_ms,
        },
        StatusCode::REQUEST_TIMEOUT => ContractError::model_request(provider, detail),
        s if s.is_server_error() => ContractError::model_request(provider, detail),
        _ => ContractError::model_rejected(provider, detail),
    }
}

fn truncate(body: &str) -> &str {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

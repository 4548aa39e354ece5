// src/transport.rs
//! Retry-with-backoff wrapper around `reqwest`.
//!
//! Only HTTP-level transient statuses are retried. Network errors (refused
//! connection, DNS) return on the first attempt.

use std::time::Duration;

use metrics::counter;
use rand::Rng;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::cancel::Cancel;

const USER_AGENT: &str = concat!(
    "lesson-catalog/",
    env!("CARGO_PKG_VERSION"),
    " (+github.com/lumlich/lesson-catalog)"
);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("execute request: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx response, already classified. `message` comes from the caller's
    /// formatter when one is supplied.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("request failed")]
    Exhausted,
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Formatter that ignores the body and names the upstream, e.g. "github returned status 503".
    pub fn upstream(name: &str, status: StatusCode) -> Self {
        TransportError::Status {
            status: status.as_u16(),
            message: format!("{name} returned status {}", status.as_u16()),
        }
    }
}

/// Builds a descriptive error from a non-2xx status and the response body.
pub type ErrorFormatter = fn(StatusCode, &[u8]) -> TransportError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Exponential part only: `base * 2^attempt`, capped.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff plus up to 50% jitter, still capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.base_backoff(attempt);
        let half_ms = (delay.as_millis() / 2) as u64;
        let jitter_ms = rand::rng().random_range(0..=half_ms);
        (delay + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Shared client for outbound source calls.
pub fn build_client(timeout: Duration) -> Result<Client, TransportError> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout.min(Duration::from_secs(4)))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Send the request produced by `make_req` until it succeeds, fails permanently,
/// or the retry budget runs out. `make_req` runs once per attempt so a request is
/// never reused. A 2xx response is returned with its body unread.
pub async fn send_with_retry<F>(
    cancel: &Cancel,
    policy: &RetryPolicy,
    mut make_req: F,
    format_error: Option<ErrorFormatter>,
) -> Result<Response, TransportError>
where
    F: FnMut() -> RequestBuilder,
{
    let mut last_err: Option<TransportError> = None;

    for attempt in 0..=policy.max_retries {
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            r = make_req().send() => r?,
        };

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            b = resp.bytes() => b.unwrap_or_default(),
        };
        let err = match format_error {
            Some(f) => f(status, &body),
            None => TransportError::Status {
                status: status.as_u16(),
                message: format!(
                    "request failed with status {}: {}",
                    status.as_u16(),
                    String::from_utf8_lossy(&body).trim()
                ),
            },
        };

        if !is_retryable_status(status) || attempt == policy.max_retries {
            return Err(err);
        }
        last_err = Some(err);

        let delay = policy.backoff(attempt);
        debug!(
            status = status.as_u16(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "transient status, retrying"
        );
        counter!("transport_retries_total").increment(1);

        if !cancel.sleep(delay).await {
            return Err(TransportError::Cancelled);
        }
    }

    Err(last_err.unwrap_or(TransportError::Exhausted))
}

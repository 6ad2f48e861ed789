//! Bounded retry for idempotent outbound HTTP calls.

use std::time::Duration;

use rolebridge_core::{AppError, AppResult};
use tracing::warn;

/// Retry policy shared by the HTTP adapters.
///
/// Only used for requests that are safe to repeat. Server errors, 429
/// responses, and transport failures are retried with a linear backoff; every
/// other response is handed back to the caller for status handling.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    max_attempts: u8,
    backoff_ms: u64,
}

impl RetryPolicy {
    pub(crate) fn new(max_attempts: u8, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_ms: backoff_ms.max(50),
        }
    }

    pub(crate) async fn send<F>(
        &self,
        client: &reqwest::Client,
        operation: &str,
        mut build: F,
    ) -> AppResult<reqwest::Response>
    where
        F: FnMut(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_u8;
        let mut last_error: Option<String> = None;

        while attempt < self.max_attempts {
            attempt = attempt.saturating_add(1);

            match build(client).send().await {
                Ok(response)
                    if response.status().is_server_error()
                        || response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS =>
                {
                    last_error = Some(format!(
                        "transient HTTP status {} from {operation}",
                        response.status()
                    ));
                }
                Ok(response) => return Ok(response),
                Err(error) => {
                    last_error = Some(format!("{operation} transport error: {error}"));
                }
            }

            if attempt < self.max_attempts {
                if let Some(ref reason) = last_error {
                    warn!(attempt, reason = %reason, "retrying {operation}");
                }
                let delay = self.backoff_ms.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(AppError::Internal(last_error.unwrap_or_else(|| {
            format!("{operation} exhausted retries")
        })))
    }
}

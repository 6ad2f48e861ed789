//! Access token source for the Google Admin SDK.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use rolebridge_core::{AppError, AppResult};

use crate::http_retry::RetryPolicy;

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Margin subtracted from `expires_in` so a token is replaced before the
/// directory starts rejecting it.
const EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct RefreshTokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Mints directory access tokens from a long-lived refresh token.
///
/// Tokens are cached until shortly before expiry. The refresh grant is
/// idempotent, so transient failures are retried.
pub struct GoogleTokenSource {
    http_client: reqwest::Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    retry: RetryPolicy,
    cached: RwLock<Option<CachedToken>>,
}

impl GoogleTokenSource {
    /// Creates a token source for the given OAuth client.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        client_id: String,
        client_secret: String,
        refresh_token: String,
        max_attempts: u8,
        retry_backoff_ms: u64,
    ) -> Self {
        Self {
            http_client,
            client_id,
            client_secret,
            refresh_token,
            retry: RetryPolicy::new(max_attempts, retry_backoff_ms),
            cached: RwLock::new(None),
        }
    }

    /// Returns a bearer token valid for at least [`EXPIRY_MARGIN_SECS`].
    pub async fn access_token(&self) -> AppResult<String> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref()
                && token.expires_at > Instant::now()
            {
                return Ok(token.access_token.clone());
            }
        }

        self.refresh().await
    }

    async fn refresh(&self) -> AppResult<String> {
        let mut cached = self.cached.write().await;

        // Re-check under the write lock so concurrent callers refresh once.
        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.access_token.clone());
        }

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .retry
            .send(&self.http_client, "directory token refresh", |client| {
                client.post(TOKEN_ENDPOINT).form(&params)
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Internal(format!(
                "directory token refresh failed with status {status}"
            )));
        }

        let token = response
            .json::<RefreshTokenResponse>()
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to decode token response: {error}"))
            })?;

        let lifetime = token
            .expires_in
            .saturating_sub(EXPIRY_MARGIN_SECS)
            .max(EXPIRY_MARGIN_SECS);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });

        debug!("refreshed directory access token");

        Ok(token.access_token)
    }
}

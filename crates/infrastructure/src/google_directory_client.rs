//! Google Admin SDK group membership adapter.

use std::sync::Arc;

use async_trait::async_trait;

use rolebridge_application::{GroupDirectory, MemberInsert};
use rolebridge_core::{AppError, AppResult};
use rolebridge_domain::EmailAddress;

use crate::google_token_source::GoogleTokenSource;
use crate::http_retry::RetryPolicy;

const DIRECTORY_API_BASE: &str = "https://admin.googleapis.com/admin/directory/v1";

/// Group membership adapter backed by the Admin SDK Directory API.
///
/// Membership checks are retried. Inserts and removals are sent at most once
/// per call; after a timed-out mutation the next reconciliation converges.
#[derive(Clone)]
pub struct GoogleDirectoryClient {
    http_client: reqwest::Client,
    token_source: Arc<GoogleTokenSource>,
    retry: RetryPolicy,
}

impl GoogleDirectoryClient {
    /// Creates a directory client using the given token source.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        token_source: Arc<GoogleTokenSource>,
        max_attempts: u8,
        retry_backoff_ms: u64,
    ) -> Self {
        Self {
            http_client,
            token_source,
            retry: RetryPolicy::new(max_attempts, retry_backoff_ms),
        }
    }
}

#[async_trait]
impl GroupDirectory for GoogleDirectoryClient {
    async fn is_member(&self, group: &EmailAddress, member: &EmailAddress) -> AppResult<bool> {
        let access_token = self.token_source.access_token().await?;
        let url = format!("{DIRECTORY_API_BASE}/groups/{group}/members/{member}");

        let response = self
            .retry
            .send(&self.http_client, "directory membership check", |client| {
                client.get(&url).bearer_auth(&access_token)
            })
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if status.is_success() {
            return Ok(true);
        }

        Err(AppError::Internal(format!(
            "directory membership check failed with status {status}"
        )))
    }

    async fn insert_member(
        &self,
        group: &EmailAddress,
        member: &EmailAddress,
    ) -> AppResult<MemberInsert> {
        let access_token = self.token_source.access_token().await?;
        let url = format!("{DIRECTORY_API_BASE}/groups/{group}/members");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&access_token)
            .json(&serde_json::json!({
                "email": member.as_str(),
                "role": "MEMBER",
            }))
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("directory member insert transport error: {error}"))
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Ok(MemberInsert::AlreadyMember);
        }
        if status.is_success() {
            return Ok(MemberInsert::Inserted);
        }

        Err(AppError::Internal(format!(
            "directory member insert failed with status {status}"
        )))
    }

    async fn remove_member(&self, group: &EmailAddress, member: &EmailAddress) -> AppResult<()> {
        let access_token = self.token_source.access_token().await?;
        let url = format!("{DIRECTORY_API_BASE}/groups/{group}/members/{member}");

        let response = self
            .http_client
            .delete(&url)
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("directory member removal transport error: {error}"))
            })?;

        let status = response.status();
        // A 404 means the membership is already gone.
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        Err(AppError::Internal(format!(
            "directory member removal failed with status {status}"
        )))
    }
}

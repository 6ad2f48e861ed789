//! Application service for the account linking flow.
//!
//! A link starts in chat, passes through the identity provider's consent
//! screen, and finishes on the callback route. The `state` parameter is a
//! single-use token so a forged callback can never attach someone else's
//! mailbox to a platform account.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use rolebridge_core::{AppError, AppResult};
use rolebridge_domain::{EmailAddress, ExternalUserId};

use crate::reconciliation_service::IdentityLinkRepository;

const LINK_TOKEN_TTL_MINUTES: i64 = 10;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Stored state token, returned once when the token is consumed.
#[derive(Debug, Clone)]
pub struct LinkTokenRecord {
    /// Token identifier.
    pub id: Uuid,
    /// Platform user the link attempt belongs to.
    pub external_user_id: ExternalUserId,
    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

/// Persistence port for link state tokens. Only token hashes are stored.
#[async_trait]
pub trait LinkTokenRepository: Send + Sync {
    /// Stores a new token hash for the given platform user.
    async fn create(
        &self,
        token_hash: &str,
        external_user_id: &ExternalUserId,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Uuid>;

    /// Atomically consumes an unused, unexpired token.
    ///
    /// Returns `Ok(None)` when the hash is unknown, already used, or expired.
    async fn consume_valid(&self, token_hash: &str) -> AppResult<Option<LinkTokenRecord>>;

    /// Invalidates every outstanding token for the given platform user.
    async fn invalidate_for_user(&self, external_user_id: &ExternalUserId) -> AppResult<()>;
}

/// Port to the identity provider used to prove mailbox ownership.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Builds the consent URL carrying `state` back to the callback route.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchanges an authorization code for the verified mailbox address.
    async fn verified_email(&self, code: &str) -> AppResult<EmailAddress>;
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of a completed link, echoed back on the confirmation page.
#[derive(Debug, Clone)]
pub struct LinkCompletion {
    /// Platform account that was linked.
    pub external_user_id: ExternalUserId,
    /// Verified directory mailbox it now maps to.
    pub directory_email: EmailAddress,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Issues link tokens and records verified identity links.
#[derive(Clone)]
pub struct LinkingService {
    token_repository: Arc<dyn LinkTokenRepository>,
    identity_verifier: Arc<dyn IdentityVerifier>,
    link_repository: Arc<dyn IdentityLinkRepository>,
}

impl LinkingService {
    /// Creates a new linking service.
    #[must_use]
    pub fn new(
        token_repository: Arc<dyn LinkTokenRepository>,
        identity_verifier: Arc<dyn IdentityVerifier>,
        link_repository: Arc<dyn IdentityLinkRepository>,
    ) -> Self {
        Self {
            token_repository,
            identity_verifier,
            link_repository,
        }
    }

    /// Starts a link for the given platform user and returns the consent URL.
    ///
    /// Earlier tokens for the same user are invalidated first, so at most one
    /// link attempt is outstanding per user.
    pub async fn begin_link(&self, external_user_id: &ExternalUserId) -> AppResult<String> {
        self.token_repository
            .invalidate_for_user(external_user_id)
            .await?;

        let (token, token_hash) = generate_token()?;
        let expires_at = Utc::now() + Duration::minutes(LINK_TOKEN_TTL_MINUTES);
        let token_id = self
            .token_repository
            .create(&token_hash, external_user_id, expires_at)
            .await?;

        info!(user = %external_user_id, token = %token_id, "issued link token");

        Ok(self.identity_verifier.authorization_url(&token))
    }

    /// Finishes a link from the provider callback.
    ///
    /// The state token is consumed before the code exchange, so a replayed
    /// callback fails closed without touching the identity provider.
    pub async fn complete_link(&self, state: &str, code: &str) -> AppResult<LinkCompletion> {
        let record = self
            .token_repository
            .consume_valid(&hash_token(state))
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid or expired link token".to_owned()))?;

        let directory_email = self.identity_verifier.verified_email(code).await?;

        self.link_repository
            .upsert_link(&record.external_user_id, &directory_email)
            .await?;

        info!(user = %record.external_user_id, "identity link completed");

        Ok(LinkCompletion {
            external_user_id: record.external_user_id,
            directory_email,
        })
    }
}

/// Generates a cryptographically random state token and its SHA-256 hash.
///
/// Returns `(raw_token_hex, sha256_hash_hex)`.
fn generate_token() -> AppResult<(String, String)> {
    use std::fmt::Write;

    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes)
        .map_err(|error| AppError::Internal(format!("failed to generate link token: {error}")))?;

    let raw_token = bytes
        .iter()
        .fold(String::with_capacity(64), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        });

    let hash = hash_token(&raw_token);
    Ok((raw_token, hash))
}

/// Computes the SHA-256 hash of a token string for storage.
fn hash_token(raw_token: &str) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write;

    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    let result = hasher.finalize();

    result
        .iter()
        .fold(String::with_capacity(64), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        })
}

#[cfg(test)]
mod tests;

//! Google OAuth adapter for mailbox ownership verification.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use rolebridge_application::IdentityVerifier;
use rolebridge_core::{AppError, AppResult};
use rolebridge_domain::EmailAddress;

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const OAUTH_SCOPE: &str = "openid email";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    email_verified: Option<bool>,
}

/// Proves mailbox ownership through the Google consent flow.
#[derive(Clone)]
pub struct GoogleIdentityVerifier {
    http_client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl GoogleIdentityVerifier {
    /// Creates a verifier for the given OAuth client.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            http_client,
            client_id,
            client_secret,
            redirect_uri,
        }
    }
}

#[async_trait]
impl IdentityVerifier for GoogleIdentityVerifier {
    fn authorization_url(&self, state: &str) -> String {
        Url::parse_with_params(
            AUTHORIZATION_ENDPOINT,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", OAUTH_SCOPE),
                ("state", state),
            ],
        )
        .map(String::from)
        .unwrap_or_else(|_| AUTHORIZATION_ENDPOINT.to_owned())
    }

    async fn verified_email(&self, code: &str) -> AppResult<EmailAddress> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .http_client
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("authorization code exchange transport error: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Unauthorized(format!(
                "authorization code exchange failed with status {status}"
            )));
        }

        let token = response.json::<TokenResponse>().await.map_err(|error| {
            AppError::Internal(format!("failed to decode token response: {error}"))
        })?;

        let response = self
            .http_client
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("userinfo lookup transport error: {error}"))
            })?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "userinfo lookup failed with status {}",
                response.status()
            )));
        }

        let info = response
            .json::<UserInfo>()
            .await
            .map_err(|error| AppError::Internal(format!("failed to decode userinfo: {error}")))?;

        if info.email_verified != Some(true) {
            return Err(AppError::Unauthorized(
                "google account email is not verified".to_owned(),
            ));
        }

        let email = info
            .email
            .ok_or_else(|| AppError::Unauthorized("google account has no email claim".to_owned()))?;

        EmailAddress::new(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> GoogleIdentityVerifier {
        GoogleIdentityVerifier::new(
            reqwest::Client::new(),
            "client-id".to_owned(),
            "client-secret".to_owned(),
            "https://rolebridge.example.com/auth/google/callback".to_owned(),
        )
    }

    #[test]
    fn authorization_url_targets_the_consent_endpoint() {
        let url = verifier().authorization_url("state-token");

        assert!(url.starts_with(AUTHORIZATION_ENDPOINT));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=state-token"));
    }

    #[test]
    fn authorization_url_requests_the_email_scope() {
        let url = verifier().authorization_url("state-token");

        assert!(url.contains("scope=openid+email"));
    }

    #[test]
    fn authorization_url_escapes_the_redirect_uri() {
        let url = verifier().authorization_url("state-token");

        assert!(url.contains(
            "redirect_uri=https%3A%2F%2Frolebridge.example.com%2Fauth%2Fgoogle%2Fcallback"
        ));
    }
}

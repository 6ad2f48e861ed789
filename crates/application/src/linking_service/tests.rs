use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use rolebridge_core::{AppError, AppResult};
use rolebridge_domain::{EmailAddress, ExternalUserId};

use crate::reconciliation_service::IdentityLinkRepository;

use super::{IdentityVerifier, LinkTokenRecord, LinkTokenRepository, LinkingService, hash_token};

struct StoredToken {
    id: Uuid,
    token_hash: String,
    external_user_id: ExternalUserId,
    expires_at: DateTime<Utc>,
    used: bool,
}

#[derive(Default)]
struct FakeTokenRepository {
    tokens: Mutex<Vec<StoredToken>>,
}

impl FakeTokenRepository {
    fn seed(&self, token_hash: &str, external_user_id: &str, expires_at: DateTime<Utc>) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.push(StoredToken {
                id: Uuid::new_v4(),
                token_hash: token_hash.to_owned(),
                external_user_id: user(external_user_id),
                expires_at,
                used: false,
            });
        }
    }

    fn stored_hashes(&self) -> Vec<String> {
        self.tokens
            .lock()
            .ok()
            .map(|tokens| tokens.iter().map(|stored| stored.token_hash.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LinkTokenRepository for FakeTokenRepository {
    async fn create(
        &self,
        token_hash: &str,
        external_user_id: &ExternalUserId,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        self.tokens
            .lock()
            .map_err(|error| AppError::Internal(format!("failed to lock token state: {error}")))?
            .push(StoredToken {
                id,
                token_hash: token_hash.to_owned(),
                external_user_id: external_user_id.clone(),
                expires_at,
                used: false,
            });
        Ok(id)
    }

    async fn consume_valid(&self, token_hash: &str) -> AppResult<Option<LinkTokenRecord>> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|error| AppError::Internal(format!("failed to lock token state: {error}")))?;
        let now = Utc::now();

        for stored in tokens.iter_mut() {
            if stored.token_hash == token_hash && !stored.used && stored.expires_at > now {
                stored.used = true;
                return Ok(Some(LinkTokenRecord {
                    id: stored.id,
                    external_user_id: stored.external_user_id.clone(),
                    expires_at: stored.expires_at,
                }));
            }
        }

        Ok(None)
    }

    async fn invalidate_for_user(&self, external_user_id: &ExternalUserId) -> AppResult<()> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|error| AppError::Internal(format!("failed to lock token state: {error}")))?;

        for stored in tokens.iter_mut() {
            if stored.external_user_id == *external_user_id {
                stored.used = true;
            }
        }

        Ok(())
    }
}

struct FakeVerifier {
    directory_email: EmailAddress,
    failing: bool,
    exchanges: Mutex<u32>,
}

impl FakeVerifier {
    fn verifying(address: &str) -> Self {
        Self {
            directory_email: email(address),
            failing: false,
            exchanges: Mutex::new(0),
        }
    }

    fn failing(address: &str) -> Self {
        Self {
            directory_email: email(address),
            failing: true,
            exchanges: Mutex::new(0),
        }
    }

    fn exchange_count(&self) -> u32 {
        self.exchanges.lock().ok().map(|count| *count).unwrap_or(0)
    }
}

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://consent.example.com/authorize?state={state}")
    }

    async fn verified_email(&self, _code: &str) -> AppResult<EmailAddress> {
        if let Ok(mut count) = self.exchanges.lock() {
            *count += 1;
        }

        if self.failing {
            return Err(AppError::Internal("injected exchange failure".to_owned()));
        }

        Ok(self.directory_email.clone())
    }
}

#[derive(Default)]
struct FakeLinkRepository {
    links: Mutex<BTreeMap<String, EmailAddress>>,
}

impl FakeLinkRepository {
    fn linked_email(&self, external_user_id: &str) -> Option<EmailAddress> {
        self.links
            .lock()
            .ok()
            .and_then(|links| links.get(external_user_id).cloned())
    }
}

#[async_trait]
impl IdentityLinkRepository for FakeLinkRepository {
    async fn upsert_link(
        &self,
        external_user_id: &ExternalUserId,
        directory_email: &EmailAddress,
    ) -> AppResult<()> {
        self.links
            .lock()
            .map_err(|error| AppError::Internal(format!("failed to lock link state: {error}")))?
            .insert(external_user_id.as_str().to_owned(), directory_email.clone());
        Ok(())
    }

    async fn find_link(
        &self,
        external_user_id: &ExternalUserId,
    ) -> AppResult<Option<EmailAddress>> {
        Ok(self
            .links
            .lock()
            .map_err(|error| AppError::Internal(format!("failed to lock link state: {error}")))?
            .get(external_user_id.as_str())
            .cloned())
    }
}

fn user(id: &str) -> ExternalUserId {
    ExternalUserId::new(id).unwrap_or_else(|_| panic!("test user"))
}

fn email(value: &str) -> EmailAddress {
    EmailAddress::new(value).unwrap_or_else(|_| panic!("test email"))
}

fn state_from(url: &str) -> String {
    url.split_once("state=")
        .map(|(_, token)| token.to_owned())
        .unwrap_or_default()
}

fn service(
    tokens: Arc<FakeTokenRepository>,
    verifier: Arc<FakeVerifier>,
    links: Arc<FakeLinkRepository>,
) -> LinkingService {
    LinkingService::new(tokens, verifier, links)
}

#[tokio::test]
async fn begin_link_returns_consent_url_with_fresh_token() {
    let tokens = Arc::new(FakeTokenRepository::default());
    let verifier = Arc::new(FakeVerifier::verifying("user@example.com"));
    let links = Arc::new(FakeLinkRepository::default());
    let service = service(tokens.clone(), verifier, links);

    let url = service.begin_link(&user("1001")).await;

    let url = url.unwrap_or_else(|_| panic!("test url"));
    assert!(url.starts_with("https://consent.example.com/authorize?state="));

    let token = state_from(&url);
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|character| character.is_ascii_hexdigit()));

    let hashes = tokens.stored_hashes();
    assert_eq!(hashes.len(), 1);
    assert_ne!(hashes[0], token);
}

#[tokio::test]
async fn begin_link_invalidates_earlier_tokens() {
    let tokens = Arc::new(FakeTokenRepository::default());
    let verifier = Arc::new(FakeVerifier::verifying("user@example.com"));
    let links = Arc::new(FakeLinkRepository::default());
    let service = service(tokens, verifier, links);

    let first = service.begin_link(&user("1001")).await;
    let second = service.begin_link(&user("1001")).await;

    let first_token = state_from(&first.unwrap_or_else(|_| panic!("test url")));
    let second_token = state_from(&second.unwrap_or_else(|_| panic!("test url")));

    let stale = service.complete_link(&first_token, "auth-code").await;
    assert!(matches!(stale, Err(AppError::Unauthorized(_))));

    let fresh = service.complete_link(&second_token, "auth-code").await;
    assert!(fresh.is_ok());
}

#[tokio::test]
async fn complete_link_records_the_verified_mailbox() {
    let tokens = Arc::new(FakeTokenRepository::default());
    let verifier = Arc::new(FakeVerifier::verifying("user@example.com"));
    let links = Arc::new(FakeLinkRepository::default());
    let service = service(tokens, verifier, links.clone());

    let url = service.begin_link(&user("1001")).await;
    let token = state_from(&url.unwrap_or_else(|_| panic!("test url")));

    let completion = service.complete_link(&token, "auth-code").await;

    let completion = completion.unwrap_or_else(|_| panic!("test completion"));
    assert_eq!(completion.external_user_id, user("1001"));
    assert_eq!(completion.directory_email, email("user@example.com"));
    assert_eq!(links.linked_email("1001"), Some(email("user@example.com")));
}

#[tokio::test]
async fn unknown_state_token_is_rejected() {
    let tokens = Arc::new(FakeTokenRepository::default());
    let verifier = Arc::new(FakeVerifier::verifying("user@example.com"));
    let links = Arc::new(FakeLinkRepository::default());
    let service = service(tokens, verifier.clone(), links.clone());

    let result = service.complete_link("not-a-token", "auth-code").await;

    assert!(matches!(result, Err(AppError::Unauthorized(_))));
    assert_eq!(verifier.exchange_count(), 0);
    assert_eq!(links.linked_email("1001"), None);
}

#[tokio::test]
async fn state_token_is_single_use() {
    let tokens = Arc::new(FakeTokenRepository::default());
    let verifier = Arc::new(FakeVerifier::verifying("user@example.com"));
    let links = Arc::new(FakeLinkRepository::default());
    let service = service(tokens, verifier.clone(), links);

    let url = service.begin_link(&user("1001")).await;
    let token = state_from(&url.unwrap_or_else(|_| panic!("test url")));

    let first = service.complete_link(&token, "auth-code").await;
    assert!(first.is_ok());

    let replay = service.complete_link(&token, "auth-code").await;
    assert!(matches!(replay, Err(AppError::Unauthorized(_))));
    assert_eq!(verifier.exchange_count(), 1);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let tokens = Arc::new(FakeTokenRepository::default());
    let verifier = Arc::new(FakeVerifier::verifying("user@example.com"));
    let links = Arc::new(FakeLinkRepository::default());

    let raw = "ab".repeat(32);
    tokens.seed(&hash_token(&raw), "1001", Utc::now() - Duration::minutes(1));

    let service = service(tokens, verifier.clone(), links);
    let result = service.complete_link(&raw, "auth-code").await;

    assert!(matches!(result, Err(AppError::Unauthorized(_))));
    assert_eq!(verifier.exchange_count(), 0);
}

#[tokio::test]
async fn failed_code_exchange_leaves_no_link() {
    let tokens = Arc::new(FakeTokenRepository::default());
    let verifier = Arc::new(FakeVerifier::failing("user@example.com"));
    let links = Arc::new(FakeLinkRepository::default());
    let service = service(tokens, verifier, links.clone());

    let url = service.begin_link(&user("1001")).await;
    let token = state_from(&url.unwrap_or_else(|_| panic!("test url")));

    let result = service.complete_link(&token, "auth-code").await;
    assert!(matches!(result, Err(AppError::Internal(_))));
    assert_eq!(links.linked_email("1001"), None);

    // The token is burned before the exchange, so the callback cannot be retried.
    let replay = service.complete_link(&token, "auth-code").await;
    assert!(matches!(replay, Err(AppError::Unauthorized(_))));
}

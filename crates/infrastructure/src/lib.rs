//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod discord_role_provider;
mod google_directory_client;
mod google_identity_verifier;
mod google_token_source;
mod http_retry;
mod postgres_identity_link_repository;
mod postgres_link_token_repository;

pub use discord_role_provider::DiscordRoleProvider;
pub use google_directory_client::GoogleDirectoryClient;
pub use google_identity_verifier::GoogleIdentityVerifier;
pub use google_token_source::GoogleTokenSource;
pub use postgres_identity_link_repository::PostgresIdentityLinkRepository;
pub use postgres_link_token_repository::PostgresLinkTokenRepository;

//! Rolebridge API composition root.

#![forbid(unsafe_code)]

mod error;
mod handlers;
mod middleware;
mod state;

use std::env;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use rolebridge_application::{LinkingService, ReconciliationService};
use rolebridge_core::{AppError, AppResult};
use rolebridge_domain::{PolicyRule, RolePolicy};
use rolebridge_infrastructure::{
    DiscordRoleProvider, GoogleDirectoryClient, GoogleIdentityVerifier, GoogleTokenSource,
    PostgresIdentityLinkRepository, PostgresLinkTokenRepository,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

    let database_url = required_env("DATABASE_URL")?;
    let public_base_url = env::var("PUBLIC_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:3001".to_owned())
        .trim_end_matches('/')
        .to_owned();
    Url::parse(&public_base_url)
        .map_err(|error| AppError::Validation(format!("invalid PUBLIC_BASE_URL: {error}")))?;

    let notifier_shared_secret = required_env("NOTIFIER_SHARED_SECRET")?;
    if notifier_shared_secret.len() < 32 {
        return Err(AppError::Validation(
            "NOTIFIER_SHARED_SECRET must be at least 32 characters".to_owned(),
        ));
    }

    let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let api_port = env::var("API_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3001);

    let google_client_id = required_non_empty_env("GOOGLE_CLIENT_ID")?;
    let google_client_secret = required_non_empty_env("GOOGLE_CLIENT_SECRET")?;
    let google_admin_refresh_token = required_non_empty_env("GOOGLE_ADMIN_REFRESH_TOKEN")?;
    let discord_bot_token = required_non_empty_env("DISCORD_BOT_TOKEN")?;
    let discord_guild_id = required_non_empty_env("DISCORD_GUILD_ID")?;

    let policy_file = env::var("POLICY_FILE").unwrap_or_else(|_| "policy.json".to_owned());
    let directory_max_attempts = parse_env_u8("DIRECTORY_MAX_ATTEMPTS", 3)?;
    let directory_retry_backoff_ms = parse_env_u64("DIRECTORY_RETRY_BACKOFF_MS", 250)?;

    // A malformed policy table must stop the process before it serves traffic.
    let policy = Arc::new(load_policy(policy_file.as_str())?);
    info!(
        rules = policy.rule_count(),
        groups = policy.mapped_groups().len(),
        "role policy loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    if migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    let link_repository = Arc::new(PostgresIdentityLinkRepository::new(pool.clone()));
    let token_repository = Arc::new(PostgresLinkTokenRepository::new(pool));

    let role_provider = Arc::new(DiscordRoleProvider::new(
        http_client.clone(),
        discord_bot_token,
        discord_guild_id,
        directory_max_attempts,
        directory_retry_backoff_ms,
    ));

    let token_source = Arc::new(GoogleTokenSource::new(
        http_client.clone(),
        google_client_id.clone(),
        google_client_secret.clone(),
        google_admin_refresh_token,
        directory_max_attempts,
        directory_retry_backoff_ms,
    ));
    let group_directory = Arc::new(GoogleDirectoryClient::new(
        http_client.clone(),
        token_source,
        directory_max_attempts,
        directory_retry_backoff_ms,
    ));

    let identity_verifier = Arc::new(GoogleIdentityVerifier::new(
        http_client,
        google_client_id,
        google_client_secret,
        format!("{public_base_url}/auth/google/callback"),
    ));

    let reconciliation_service = ReconciliationService::new(
        link_repository.clone(),
        role_provider,
        group_directory,
        policy,
    );
    let linking_service = LinkingService::new(token_repository, identity_verifier, link_repository);

    let app_state = AppState {
        linking_service,
        reconciliation_service,
        notifier_shared_secret,
    };

    let internal_routes = Router::new()
        .route(
            "/api/internal/sync",
            post(handlers::sync::sync_user_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_notifier_auth,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route("/auth/link", get(handlers::link::begin_link_handler))
        .route(
            "/auth/google/callback",
            get(handlers::link::google_callback_handler),
        )
        .merge(internal_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let host = IpAddr::from_str(&api_host)
        .map_err(|error| AppError::Internal(format!("invalid API_HOST '{api_host}': {error}")))?;
    let address = SocketAddr::from((host, api_port));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "rolebridge-api listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}

fn load_policy(path: &str) -> AppResult<RolePolicy> {
    let raw = fs::read_to_string(path).map_err(|error| {
        AppError::Validation(format!("failed to read policy file '{path}': {error}"))
    })?;
    let rules: Vec<PolicyRule> = serde_json::from_str(&raw).map_err(|error| {
        AppError::Validation(format!("failed to parse policy file '{path}': {error}"))
    })?;

    RolePolicy::new(rules)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn required_non_empty_env(name: &str) -> AppResult<String> {
    let value = required_env(name)?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}

fn parse_env_u8(name: &str, default: u8) -> AppResult<u8> {
    match env::var(name) {
        Ok(value) => value.parse::<u8>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use rolebridge_application::IdentityLinkRepository;
use rolebridge_domain::{EmailAddress, ExternalUserId};

use super::PostgresIdentityLinkRepository;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for identity link repository tests: {error}");
    }

    Some(pool)
}

fn fresh_user() -> ExternalUserId {
    ExternalUserId::new(format!("user-{}", Uuid::new_v4())).unwrap_or_else(|_| unreachable!())
}

fn address(value: &str) -> EmailAddress {
    EmailAddress::new(value).unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn upsert_then_find_returns_the_mapping() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresIdentityLinkRepository::new(pool);
    let user = fresh_user();

    let upsert = repository
        .upsert_link(&user, &address("member@example.com"))
        .await;
    assert!(upsert.is_ok());

    let found = repository.find_link(&user).await;
    assert!(found.is_ok());
    assert_eq!(
        found.unwrap_or_default(),
        Some(address("member@example.com"))
    );
}

#[tokio::test]
async fn upsert_replaces_the_previous_mapping() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresIdentityLinkRepository::new(pool);
    let user = fresh_user();

    let first = repository
        .upsert_link(&user, &address("old@example.com"))
        .await;
    assert!(first.is_ok());

    let second = repository
        .upsert_link(&user, &address("new@example.com"))
        .await;
    assert!(second.is_ok());

    let found = repository.find_link(&user).await;
    assert!(found.is_ok());
    assert_eq!(found.unwrap_or_default(), Some(address("new@example.com")));
}

#[tokio::test]
async fn missing_link_reads_as_none() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresIdentityLinkRepository::new(pool);

    let found = repository.find_link(&fresh_user()).await;
    assert!(found.is_ok());
    assert_eq!(found.unwrap_or_else(|_| unreachable!()), None);
}

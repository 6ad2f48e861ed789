//! PostgreSQL-backed link token repository.

use async_trait::async_trait;
use sqlx::PgPool;

use rolebridge_application::{LinkTokenRecord, LinkTokenRepository};
use rolebridge_core::{AppError, AppResult};
use rolebridge_domain::ExternalUserId;

/// PostgreSQL implementation of the link token repository port.
#[derive(Clone)]
pub struct PostgresLinkTokenRepository {
    pool: PgPool,
}

impl PostgresLinkTokenRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkTokenRepository for PostgresLinkTokenRepository {
    async fn create(
        &self,
        token_hash: &str,
        external_user_id: &ExternalUserId,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<uuid::Uuid> {
        let id = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            INSERT INTO link_tokens (token_hash, external_user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(token_hash)
        .bind(external_user_id.as_str())
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create link token: {error}")))?;

        Ok(id)
    }

    async fn consume_valid(&self, token_hash: &str) -> AppResult<Option<LinkTokenRecord>> {
        let row = sqlx::query_as::<_, LinkTokenRow>(
            r#"
            UPDATE link_tokens
            SET used_at = now()
            WHERE token_hash = $1
              AND used_at IS NULL
              AND expires_at > now()
            RETURNING id, external_user_id, expires_at
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to consume link token: {error}")))?;

        row.map(LinkTokenRecord::try_from).transpose()
    }

    async fn invalidate_for_user(&self, external_user_id: &ExternalUserId) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE link_tokens
            SET used_at = now()
            WHERE external_user_id = $1
              AND used_at IS NULL
            "#,
        )
        .bind(external_user_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to invalidate link tokens: {error}")))?;

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LinkTokenRow {
    id: uuid::Uuid,
    external_user_id: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<LinkTokenRow> for LinkTokenRecord {
    type Error = AppError;

    fn try_from(row: LinkTokenRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            external_user_id: ExternalUserId::new(row.external_user_id)?,
            expires_at: row.expires_at,
        })
    }
}

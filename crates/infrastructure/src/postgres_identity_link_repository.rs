//! PostgreSQL-backed identity link repository.

use async_trait::async_trait;
use sqlx::PgPool;

use rolebridge_application::IdentityLinkRepository;
use rolebridge_core::{AppError, AppResult};
use rolebridge_domain::{EmailAddress, ExternalUserId};

/// PostgreSQL implementation of the identity link repository port.
#[derive(Clone)]
pub struct PostgresIdentityLinkRepository {
    pool: PgPool,
}

impl PostgresIdentityLinkRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityLinkRepository for PostgresIdentityLinkRepository {
    async fn upsert_link(
        &self,
        external_user_id: &ExternalUserId,
        directory_email: &EmailAddress,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO identity_links (external_user_id, directory_email)
            VALUES ($1, $2)
            ON CONFLICT (external_user_id)
            DO UPDATE SET directory_email = EXCLUDED.directory_email, updated_at = now()
            "#,
        )
        .bind(external_user_id.as_str())
        .bind(directory_email.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to upsert identity link: {error}")))?;

        Ok(())
    }

    async fn find_link(
        &self,
        external_user_id: &ExternalUserId,
    ) -> AppResult<Option<EmailAddress>> {
        let directory_email = sqlx::query_scalar::<_, String>(
            r#"
            SELECT directory_email
            FROM identity_links
            WHERE external_user_id = $1
            "#,
        )
        .bind(external_user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load identity link: {error}")))?;

        directory_email.map(EmailAddress::new).transpose()
    }
}

#[cfg(test)]
mod tests;

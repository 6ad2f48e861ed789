//! Discord-backed role provider.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;

use rolebridge_application::RoleProvider;
use rolebridge_core::{AppError, AppResult};
use rolebridge_domain::{ExternalUserId, RoleId};

use crate::http_retry::RetryPolicy;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Guild member payload, reduced to the fields we read.
#[derive(Debug, Deserialize)]
struct GuildMember {
    roles: Vec<String>,
}

/// Role provider backed by the Discord guild members API.
#[derive(Clone)]
pub struct DiscordRoleProvider {
    http_client: reqwest::Client,
    bot_token: String,
    guild_id: String,
    retry: RetryPolicy,
}

impl DiscordRoleProvider {
    /// Creates a provider for the given guild.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        bot_token: String,
        guild_id: String,
        max_attempts: u8,
        retry_backoff_ms: u64,
    ) -> Self {
        Self {
            http_client,
            bot_token,
            guild_id,
            retry: RetryPolicy::new(max_attempts, retry_backoff_ms),
        }
    }
}

#[async_trait]
impl RoleProvider for DiscordRoleProvider {
    async fn member_roles(
        &self,
        external_user_id: &ExternalUserId,
    ) -> AppResult<BTreeSet<RoleId>> {
        let url = format!(
            "{DISCORD_API_BASE}/guilds/{}/members/{}",
            self.guild_id,
            external_user_id.as_str()
        );

        let response = self
            .retry
            .send(&self.http_client, "guild member lookup", |client| {
                client
                    .get(&url)
                    .header("Authorization", format!("Bot {}", self.bot_token))
            })
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!(
                "guild member '{external_user_id}' not found"
            )));
        }
        if !status.is_success() {
            return Err(AppError::Internal(format!(
                "guild member lookup failed with status {status}"
            )));
        }

        let member = response.json::<GuildMember>().await.map_err(|error| {
            AppError::Internal(format!("failed to decode guild member: {error}"))
        })?;

        member
            .roles
            .into_iter()
            .map(RoleId::new)
            .collect::<AppResult<BTreeSet<RoleId>>>()
    }
}

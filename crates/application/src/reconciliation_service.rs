//! Group membership reconciliation ports and application service.
//!
//! Given a linked directory identity and a live role snapshot, computes the
//! membership diff against the role policy and applies it group by group,
//! checking current membership before every mutation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use rolebridge_core::AppResult;
use rolebridge_domain::{EmailAddress, ExternalUserId, RoleId, RolePolicy};

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Repository port for the external-user to directory-email mapping.
#[async_trait]
pub trait IdentityLinkRepository: Send + Sync {
    /// Stores the mapping, atomically replacing any previous value for the
    /// same user.
    async fn upsert_link(
        &self,
        external_user_id: &ExternalUserId,
        directory_email: &EmailAddress,
    ) -> AppResult<()>;

    /// Returns the mapped directory email, or `None` when the user has not
    /// linked an identity yet.
    async fn find_link(
        &self,
        external_user_id: &ExternalUserId,
    ) -> AppResult<Option<EmailAddress>>;
}

/// Port for reading a user's current role set from the chat platform.
#[async_trait]
pub trait RoleProvider: Send + Sync {
    /// Returns the user's current roles.
    ///
    /// Fails with `AppError::NotFound` when the user or the configured
    /// community is unknown to the platform.
    async fn member_roles(&self, external_user_id: &ExternalUserId) -> AppResult<BTreeSet<RoleId>>;
}

/// Outcome of a membership insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberInsert {
    /// The membership was created by this call.
    Inserted,
    /// The directory already held the membership.
    AlreadyMember,
}

/// Port for directory group membership reads and mutations.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Whether the member currently belongs to the group.
    ///
    /// `Ok(false)` means the directory verified the member is absent; an
    /// error means membership could not be determined.
    async fn is_member(&self, group: &EmailAddress, member: &EmailAddress) -> AppResult<bool>;

    /// Adds the member to the group.
    async fn insert_member(
        &self,
        group: &EmailAddress,
        member: &EmailAddress,
    ) -> AppResult<MemberInsert>;

    /// Removes the member from the group.
    async fn remove_member(&self, group: &EmailAddress, member: &EmailAddress) -> AppResult<()>;
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    /// Groups this run inserted the user into.
    pub added: Vec<EmailAddress>,
    /// Groups this run removed the user from.
    pub removed: Vec<EmailAddress>,
    /// True when the user has no linked identity and nothing was attempted.
    pub skipped: bool,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Application service reconciling directory group memberships with the
/// role policy.
#[derive(Clone)]
pub struct ReconciliationService {
    link_repository: Arc<dyn IdentityLinkRepository>,
    role_provider: Arc<dyn RoleProvider>,
    group_directory: Arc<dyn GroupDirectory>,
    policy: Arc<RolePolicy>,
    user_locks: Arc<Mutex<HashMap<ExternalUserId, Arc<Mutex<()>>>>>,
}

impl ReconciliationService {
    /// Creates a new reconciliation service.
    #[must_use]
    pub fn new(
        link_repository: Arc<dyn IdentityLinkRepository>,
        role_provider: Arc<dyn RoleProvider>,
        group_directory: Arc<dyn GroupDirectory>,
        policy: Arc<RolePolicy>,
    ) -> Self {
        Self {
            link_repository,
            role_provider,
            group_directory,
            policy,
            user_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reconciles one user's directory group memberships with their roles.
    ///
    /// Returns a skipped report when the user has no linked identity. A
    /// failed role lookup aborts the run; individual group failures are
    /// logged and skipped so the remaining groups still reconcile. Runs for
    /// the same user serialize; distinct users proceed concurrently.
    pub async fn reconcile(
        &self,
        external_user_id: &ExternalUserId,
    ) -> AppResult<ReconciliationReport> {
        let user_lock = self.user_lock(external_user_id).await;
        let _guard = user_lock.lock().await;

        let Some(directory_email) = self.link_repository.find_link(external_user_id).await? else {
            info!(user = %external_user_id, "reconciliation skipped, no linked identity");
            return Ok(ReconciliationReport {
                added: Vec::new(),
                removed: Vec::new(),
                skipped: true,
            });
        };

        let roles = self.role_provider.member_roles(external_user_id).await?;
        let desired = self.policy.desired_groups(&roles);

        let added = self
            .add_missing_memberships(&desired, &directory_email)
            .await;
        let removed = self
            .remove_stale_memberships(&desired, &directory_email)
            .await;

        info!(
            user = %external_user_id,
            member = %directory_email,
            role_count = roles.len(),
            added_count = added.len(),
            removed_count = removed.len(),
            "reconciliation completed"
        );

        Ok(ReconciliationReport {
            added,
            removed,
            skipped: false,
        })
    }

    /// Addition pass over the desired groups.
    async fn add_missing_memberships(
        &self,
        desired: &BTreeSet<EmailAddress>,
        member: &EmailAddress,
    ) -> Vec<EmailAddress> {
        let mut added = Vec::new();

        for group in desired {
            match self.ensure_membership(group, member).await {
                Ok(true) => added.push(group.clone()),
                Ok(false) => {}
                Err(error) => {
                    warn!(group = %group, member = %member, error = %error, "skipping group addition");
                }
            }
        }

        added
    }

    /// Returns true when this call created the membership.
    async fn ensure_membership(
        &self,
        group: &EmailAddress,
        member: &EmailAddress,
    ) -> AppResult<bool> {
        if self.group_directory.is_member(group, member).await? {
            return Ok(false);
        }

        match self.group_directory.insert_member(group, member).await? {
            MemberInsert::Inserted => Ok(true),
            // Another writer created the membership concurrently.
            MemberInsert::AlreadyMember => Ok(false),
        }
    }

    /// Removal pass over the mapped groups outside the desired set.
    async fn remove_stale_memberships(
        &self,
        desired: &BTreeSet<EmailAddress>,
        member: &EmailAddress,
    ) -> Vec<EmailAddress> {
        let mut removed = Vec::new();

        for group in self.policy.mapped_groups().difference(desired) {
            match self.retract_membership(group, member).await {
                Ok(true) => removed.push(group.clone()),
                Ok(false) => {}
                Err(error) => {
                    warn!(group = %group, member = %member, error = %error, "skipping group removal");
                }
            }
        }

        removed
    }

    /// Returns true when this call deleted the membership.
    async fn retract_membership(
        &self,
        group: &EmailAddress,
        member: &EmailAddress,
    ) -> AppResult<bool> {
        if !self.group_directory.is_member(group, member).await? {
            return Ok(false);
        }

        self.group_directory.remove_member(group, member).await?;
        Ok(true)
    }

    /// Lock handle for a user. Handles are retained for the process lifetime.
    async fn user_lock(&self, external_user_id: &ExternalUserId) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(external_user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

//! Role-to-group policy table and the pure resolver over it.

use std::collections::{BTreeMap, BTreeSet};

use rolebridge_core::{AppError, AppResult};
use serde::Deserialize;

use crate::{EmailAddress, RoleId};

/// One row of the role-to-group policy table as loaded from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyRule {
    /// Chat-platform role the rule applies to.
    pub role_id: String,
    /// Directory group granted by that role.
    pub group_email: String,
}

/// Immutable role-to-group policy table.
///
/// Built once at process start and never mutated afterwards. A role maps to
/// at most one group; several roles may map to the same group.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    rules: BTreeMap<RoleId, EmailAddress>,
    mapped_groups: BTreeSet<EmailAddress>,
}

impl RolePolicy {
    /// Builds a policy table from configuration rules.
    ///
    /// Rejects an empty table and duplicate role ids: a duplicate rule would
    /// silently override an earlier one, so it is treated as a configuration
    /// error at load time.
    pub fn new(rules: Vec<PolicyRule>) -> AppResult<Self> {
        if rules.is_empty() {
            return Err(AppError::Validation(
                "policy table must contain at least one rule".to_owned(),
            ));
        }

        let mut table = BTreeMap::new();
        let mut mapped_groups = BTreeSet::new();

        for rule in rules {
            let role_id = RoleId::new(rule.role_id)?;
            let group_email = EmailAddress::new(rule.group_email)?;

            if table.contains_key(&role_id) {
                return Err(AppError::Validation(format!(
                    "duplicate policy rule for role '{role_id}'"
                )));
            }

            mapped_groups.insert(group_email.clone());
            table.insert(role_id, group_email);
        }

        Ok(Self {
            rules: table,
            mapped_groups,
        })
    }

    /// Resolves the desired group set for a role set.
    ///
    /// Pure function over the table: roles without a mapping contribute
    /// nothing, duplicates collapse via set semantics.
    #[must_use]
    pub fn desired_groups(&self, roles: &BTreeSet<RoleId>) -> BTreeSet<EmailAddress> {
        roles
            .iter()
            .filter_map(|role| self.rules.get(role).cloned())
            .collect()
    }

    /// Every group the table references. Membership removal never reaches
    /// past this set.
    #[must_use]
    pub fn mapped_groups(&self) -> &BTreeSet<EmailAddress> {
        &self.mapped_groups
    }

    /// Number of rules in the table.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}


#[cfg(test)]
mod properties {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::{PolicyRule, RolePolicy};
    use crate::RoleId;

    fn sample_policy() -> RolePolicy {
        let rules = (0..6)
            .map(|index| PolicyRule {
                role_id: format!("role-{index}"),
                group_email: format!("group-{}@example.com", index % 3),
            })
            .collect();

        RolePolicy::new(rules).unwrap_or_else(|_| panic!("test policy"))
    }

    proptest! {
        #[test]
        fn resolution_is_deterministic_and_bounded(indices in prop::collection::btree_set(0usize..8, 0..8)) {
            let policy = sample_policy();
            let roles: BTreeSet<RoleId> = indices
                .iter()
                .map(|index| {
                    RoleId::new(format!("role-{index}")).unwrap_or_else(|_| panic!("test role"))
                })
                .collect();

            let first = policy.desired_groups(&roles);
            let second = policy.desired_groups(&roles);

            prop_assert_eq!(&first, &second);
            prop_assert!(first.is_subset(policy.mapped_groups()));
        }
    }
}

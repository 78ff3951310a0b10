use std::collections::{BTreeMap, BTreeSet};

use accessledger_domain::{PermissionCatalog, PermissionCode, RoleId};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::GrantSnapshot;

/// Where one effective permission comes from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionSource {
    /// Granted by an active role assignment.
    Direct {
        /// Granting role.
        role_id: RoleId,
    },
    /// Granted by a currently valid delegation.
    Delegated {
        /// Granting delegation rule.
        delegation_id: Uuid,
        /// Subject that delegated the permission.
        delegator: String,
    },
}

/// Computed union of direct and delegated permissions at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePermissionSet {
    subject: String,
    evaluated_at: DateTime<Utc>,
    grants: BTreeMap<PermissionCode, BTreeSet<PermissionSource>>,
}

impl EffectivePermissionSet {
    pub(super) fn from_snapshot(
        catalog: &PermissionCatalog,
        snapshot: &GrantSnapshot,
        now: DateTime<Utc>,
    ) -> Self {
        let mut grants: BTreeMap<PermissionCode, BTreeSet<PermissionSource>> = BTreeMap::new();

        for assignment in snapshot
            .active_assignments
            .iter()
            .filter(|assignment| assignment.is_active)
        {
            let Some(role) = catalog.find_role(&assignment.role_id) else {
                warn!(
                    subject = snapshot.subject.as_str(),
                    role_id = assignment.role_id.as_str(),
                    "active assignment references a role missing from the catalog"
                );
                continue;
            };

            for code in catalog.role_permissions(role) {
                grants.entry(code).or_default().insert(PermissionSource::Direct {
                    role_id: role.role_id.clone(),
                });
            }
        }

        for rule in snapshot
            .incoming_delegations
            .iter()
            .filter(|rule| rule.delegate == snapshot.subject && rule.is_currently_valid(now))
        {
            for code in rule.permissions.iter().filter(|code| catalog.contains(code)) {
                grants
                    .entry(code.clone())
                    .or_default()
                    .insert(PermissionSource::Delegated {
                        delegation_id: rule.delegation_id,
                        delegator: rule.delegator.clone(),
                    });
            }
        }

        Self {
            subject: snapshot.subject.clone(),
            evaluated_at: now,
            grants,
        }
    }

    /// Returns the subject the set was computed for.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns the instant the set was computed for.
    #[must_use]
    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluated_at
    }

    /// Returns every effective code.
    #[must_use]
    pub fn codes(&self) -> BTreeSet<PermissionCode> {
        self.grants.keys().cloned().collect()
    }

    /// Returns codes granted by at least one role.
    ///
    /// Only these can be delegated further: delegated permissions are not
    /// transitive.
    #[must_use]
    pub fn direct_codes(&self) -> BTreeSet<PermissionCode> {
        self.grants
            .iter()
            .filter(|(_, sources)| {
                sources
                    .iter()
                    .any(|source| matches!(source, PermissionSource::Direct { .. }))
            })
            .map(|(code, _)| code.clone())
            .collect()
    }

    /// Returns whether the set contains a code.
    #[must_use]
    pub fn contains(&self, code: &PermissionCode) -> bool {
        self.grants.contains_key(code)
    }

    /// Returns the provenance of one code.
    #[must_use]
    pub fn sources(&self, code: &PermissionCode) -> Option<&BTreeSet<PermissionSource>> {
        self.grants.get(code)
    }

    /// Iterates codes with their provenance, ordered by code.
    pub fn iter(&self) -> impl Iterator<Item = (&PermissionCode, &BTreeSet<PermissionSource>)> {
        self.grants.iter()
    }
}

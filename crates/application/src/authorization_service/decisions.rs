use std::collections::BTreeSet;

use accessledger_core::{AppError, AppResult, UserIdentity};
use accessledger_domain::{AuditAction, PermissionCode, RoleId};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::AuditEvent;

use super::{AuthorizationService, EffectivePermissionSet, PermissionSource};

/// Why the admin override applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOverrideSource {
    /// The identity provider flagged the subject as administrator.
    IdentityProvider,
    /// The subject holds a role with the all-permissions marker.
    Role {
        /// Granting role.
        role_id: RoleId,
    },
}

/// Basis of an authorization decision, kept for audit display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionBasis {
    /// Granted through the admin bypass, not through role or delegation.
    AdminOverride(AdminOverrideSource),
    /// Granted by one or more active roles.
    Direct {
        /// Granting roles.
        role_ids: BTreeSet<RoleId>,
    },
    /// Granted only through currently valid delegations.
    Delegated {
        /// Granting delegation rules.
        delegation_ids: BTreeSet<Uuid>,
        /// Subjects that delegated the permission.
        delegators: BTreeSet<String>,
    },
    /// Not granted.
    Denied,
}

/// Outcome of one permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    /// Checked permission.
    pub permission: PermissionCode,
    /// Whether access is granted.
    pub granted: bool,
    /// Provenance of the decision.
    pub basis: DecisionBasis,
}

impl AuthorizationService {
    /// Decides whether `actor` holds `code` at `now`.
    ///
    /// Denial is a regular decision, never an error. Only a code outside the
    /// catalog fails, with `AppError::UnknownPermission`.
    pub async fn has_permission(
        &self,
        actor: &UserIdentity,
        code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<AccessDecision> {
        let permission = self.catalog.validate_code(code)?;
        self.decide(actor, permission, now).await
    }

    /// Ensures `actor` holds an already validated permission right now.
    ///
    /// Used by services guarding their own operations; a denial becomes
    /// `AppError::Forbidden`.
    pub async fn require_permission(
        &self,
        actor: &UserIdentity,
        permission: &PermissionCode,
    ) -> AppResult<AccessDecision> {
        let decision = self.decide(actor, permission.clone(), Utc::now()).await?;
        if decision.granted {
            return Ok(decision);
        }

        Err(AppError::Forbidden(format!(
            "subject '{}' is missing permission '{}' in tenant '{}'",
            actor.subject(),
            permission,
            actor.tenant_id()
        )))
    }

    async fn decide(
        &self,
        actor: &UserIdentity,
        permission: PermissionCode,
        now: DateTime<Utc>,
    ) -> AppResult<AccessDecision> {
        let snapshot = self
            .load_snapshot(actor.tenant_id(), actor.subject())
            .await?;

        if let Some(source) = self.admin_override_for(actor, &snapshot) {
            self.append_admin_override_event(actor, &permission, &source)
                .await?;
            return Ok(AccessDecision {
                permission,
                granted: true,
                basis: DecisionBasis::AdminOverride(source),
            });
        }

        let effective = EffectivePermissionSet::from_snapshot(self.catalog.as_ref(), &snapshot, now);
        let basis = basis_for(&effective, &permission);

        if let DecisionBasis::Delegated { delegation_ids, .. } = &basis {
            self.append_delegated_use_event(actor, &permission, delegation_ids)
                .await?;
        }

        Ok(AccessDecision {
            granted: basis != DecisionBasis::Denied,
            permission,
            basis,
        })
    }

    async fn append_admin_override_event(
        &self,
        actor: &UserIdentity,
        permission: &PermissionCode,
        source: &AdminOverrideSource,
    ) -> AppResult<()> {
        let via = match source {
            AdminOverrideSource::IdentityProvider => "identity provider".to_owned(),
            AdminOverrideSource::Role { role_id } => format!("role '{role_id}'"),
        };

        info!(
            tenant_id = %actor.tenant_id(),
            subject = actor.subject(),
            permission = permission.as_str(),
            via = via.as_str(),
            "admin override granted permission"
        );

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id: actor.tenant_id(),
                subject: actor.subject().to_owned(),
                action: AuditAction::SecurityAdminOverrideUsed,
                resource_type: "permission".to_owned(),
                resource_id: permission.as_str().to_owned(),
                detail: Some(format!(
                    "admin override via {via} for permission '{permission}'"
                )),
            })
            .await
    }

    async fn append_delegated_use_event(
        &self,
        actor: &UserIdentity,
        permission: &PermissionCode,
        delegation_ids: &BTreeSet<Uuid>,
    ) -> AppResult<()> {
        let delegation_list = delegation_ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id: actor.tenant_id(),
                subject: actor.subject().to_owned(),
                action: AuditAction::SecurityDelegatedPermissionUsed,
                resource_type: "delegation_rule".to_owned(),
                resource_id: delegation_list.clone(),
                detail: Some(format!(
                    "used delegated permission '{permission}' (delegations='{delegation_list}')"
                )),
            })
            .await
    }
}

fn basis_for(effective: &EffectivePermissionSet, permission: &PermissionCode) -> DecisionBasis {
    let Some(sources) = effective.sources(permission) else {
        return DecisionBasis::Denied;
    };

    let role_ids: BTreeSet<RoleId> = sources
        .iter()
        .filter_map(|source| match source {
            PermissionSource::Direct { role_id } => Some(role_id.clone()),
            PermissionSource::Delegated { .. } => None,
        })
        .collect();

    if !role_ids.is_empty() {
        return DecisionBasis::Direct { role_ids };
    }

    let mut delegation_ids = BTreeSet::new();
    let mut delegators = BTreeSet::new();
    for source in sources {
        if let PermissionSource::Delegated {
            delegation_id,
            delegator,
        } = source
        {
            delegation_ids.insert(*delegation_id);
            delegators.insert(delegator.clone());
        }
    }

    DecisionBasis::Delegated {
        delegation_ids,
        delegators,
    }
}

use super::*;

use std::collections::BTreeSet;

use accessledger_core::AppError;
use accessledger_domain::{AuditAction, DelegationParty, DelegationRule, DelegationWindow};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::{
    AccessNotificationKind, AuditEvent, CreateDelegationInput, DelegationRevocation,
    TenantDelegation,
};

impl AccessAdminService {
    /// Creates a delegation from `input.delegator` to `input.delegate`.
    ///
    /// Everything is validated before the single row write: codes against the
    /// catalog, the window, the parties, the acting subject's authority and
    /// finally the delegator's own role-derived holdings at `now`. Permissions
    /// the delegator only holds through delegation cannot be passed on.
    pub async fn create_delegation(
        &self,
        actor: &UserIdentity,
        input: CreateDelegationInput,
        now: DateTime<Utc>,
    ) -> AppResult<DelegationRule> {
        let permissions = self.catalog.validate_codes(&input.permissions)?;
        if permissions.is_empty() {
            return Err(AppError::Validation(
                "delegation must grant at least one permission".to_owned(),
            ));
        }

        let window = DelegationWindow::new(input.starts_at, input.ends_at)?;

        let delegator = input.delegator.trim();
        let delegate = input.delegate.trim();
        if delegator.is_empty() || delegate.is_empty() {
            return Err(AppError::Validation(
                "delegation delegator and delegate must not be empty".to_owned(),
            ));
        }
        if delegator == delegate {
            return Err(AppError::Validation(format!(
                "subject '{delegator}' cannot delegate to itself"
            )));
        }

        let reason = input.reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation(
                "delegation reason must not be empty".to_owned(),
            ));
        }

        self.require_self_or(actor, delegator, &self.catalog.guards().delegations_manage)
            .await?;

        let holdings = self
            .authorization_service
            .resolve(actor.tenant_id(), delegator, now)
            .await?
            .direct_codes();
        let missing: BTreeSet<_> = permissions.difference(&holdings).collect();
        if !missing.is_empty() {
            let missing = missing
                .iter()
                .map(|code| code.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AppError::InsufficientGrant(format!(
                "subject '{delegator}' does not hold [{missing}] through a role"
            )));
        }

        let rule = DelegationRule {
            delegation_id: Uuid::new_v4(),
            delegator: delegator.to_owned(),
            delegate: delegate.to_owned(),
            permissions,
            window,
            reason: reason.to_owned(),
            is_active: true,
            created_by: actor.subject().to_owned(),
            created_at: now,
            revoked_at: None,
            revoked_by: None,
        };

        self.delegations
            .insert_delegation(actor.tenant_id(), rule.clone())
            .await?;
        self.authorization_service
            .invalidate_subject(actor.tenant_id(), &rule.delegate)
            .await;

        let codes = permission_list(&rule);
        info!(
            tenant_id = %actor.tenant_id(),
            delegation_id = %rule.delegation_id,
            delegator = rule.delegator.as_str(),
            delegate = rule.delegate.as_str(),
            permissions = codes.as_str(),
            "delegation created"
        );

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id: actor.tenant_id(),
                subject: actor.subject().to_owned(),
                action: AuditAction::SecurityDelegationCreated,
                resource_type: "delegation_rule".to_owned(),
                resource_id: rule.delegation_id.to_string(),
                detail: Some(format!(
                    "delegated [{codes}] from '{}' to '{}' between '{}' and '{}': {}",
                    rule.delegator,
                    rule.delegate,
                    rule.window.starts_at().to_rfc3339(),
                    rule.window.ends_at().to_rfc3339(),
                    rule.reason
                )),
            })
            .await?;

        self.dispatch(AccessNotification {
            tenant_id: actor.tenant_id(),
            kind: AccessNotificationKind::DelegationCreated,
            actor: actor.subject().to_owned(),
            recipients: vec![rule.delegator.clone(), rule.delegate.clone()],
            resource_id: rule.delegation_id.to_string(),
            detail: format!("delegated [{codes}] until {}", rule.window.ends_at().to_rfc3339()),
            occurred_at: now,
        })
        .await;

        Ok(rule)
    }

    /// Revokes a delegation immediately, whatever its window.
    ///
    /// Revoking an inactive rule is a no-op that still succeeds.
    pub async fn revoke_delegation(
        &self,
        actor: &UserIdentity,
        delegation_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<DelegationRevocation> {
        let rule = self
            .delegations
            .find_delegation(actor.tenant_id(), delegation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("delegation '{delegation_id}' was not found"))
            })?;

        self.require_self_or(
            actor,
            &rule.delegator,
            &self.catalog.guards().delegations_manage,
        )
        .await?;

        let revocation = self
            .delegations
            .revoke_delegation(actor.tenant_id(), delegation_id, actor.subject(), now)
            .await?;
        if !revocation.changed() {
            return Ok(revocation);
        }

        let rule = revocation.rule();
        self.authorization_service
            .invalidate_subject(actor.tenant_id(), &rule.delegate)
            .await;

        info!(
            tenant_id = %actor.tenant_id(),
            delegation_id = %rule.delegation_id,
            revoked_by = actor.subject(),
            "delegation revoked"
        );

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id: actor.tenant_id(),
                subject: actor.subject().to_owned(),
                action: AuditAction::SecurityDelegationRevoked,
                resource_type: "delegation_rule".to_owned(),
                resource_id: rule.delegation_id.to_string(),
                detail: Some(format!(
                    "revoked delegation of [{}] from '{}' to '{}'",
                    permission_list(rule),
                    rule.delegator,
                    rule.delegate
                )),
            })
            .await?;

        self.dispatch(AccessNotification {
            tenant_id: actor.tenant_id(),
            kind: AccessNotificationKind::DelegationRevoked,
            actor: actor.subject().to_owned(),
            recipients: vec![rule.delegator.clone(), rule.delegate.clone()],
            resource_id: rule.delegation_id.to_string(),
            detail: format!("revoked delegation of [{}]", permission_list(rule)),
            occurred_at: now,
        })
        .await;

        Ok(revocation)
    }

    /// Lists rules where `subject` plays `party`, most recent first.
    pub async fn list_delegations_for(
        &self,
        actor: &UserIdentity,
        subject: &str,
        party: DelegationParty,
    ) -> AppResult<Vec<DelegationRule>> {
        self.require_self_or(actor, subject, &self.catalog.guards().delegations_manage)
            .await?;

        self.delegations
            .list_delegations_for(actor.tenant_id(), subject, party)
            .await
    }

    /// Reports rules whose window closed while still flagged active.
    ///
    /// Housekeeping read for the worker; nothing is written back.
    pub async fn list_expired_active_delegations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<TenantDelegation>> {
        self.delegations
            .list_expired_active_delegations(now, limit)
            .await
    }
}

fn permission_list(rule: &DelegationRule) -> String {
    rule.permissions
        .iter()
        .map(|code| code.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

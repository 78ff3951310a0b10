mod delegations;
mod roles;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use accessledger_core::{AppResult, UserIdentity};
use accessledger_domain::{
    CheckDefinition, PermissionCatalog, PermissionCode, PermissionDefinition, RoleDefinition,
};
use tracing::warn;

use crate::{
    AccessEventNotifier, AccessNotification, AuditRepository, AuthorizationService,
    DelegationRepository, RoleAssignmentRepository,
};

/// Application service for role assignments and the delegation ledger.
#[derive(Clone)]
pub struct AccessAdminService {
    catalog: Arc<PermissionCatalog>,
    authorization_service: AuthorizationService,
    assignments: Arc<dyn RoleAssignmentRepository>,
    delegations: Arc<dyn DelegationRepository>,
    audit_repository: Arc<dyn AuditRepository>,
    notifier: Arc<dyn AccessEventNotifier>,
}

impl AccessAdminService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        catalog: Arc<PermissionCatalog>,
        authorization_service: AuthorizationService,
        assignments: Arc<dyn RoleAssignmentRepository>,
        delegations: Arc<dyn DelegationRepository>,
        audit_repository: Arc<dyn AuditRepository>,
        notifier: Arc<dyn AccessEventNotifier>,
    ) -> Self {
        Self {
            catalog,
            authorization_service,
            assignments,
            delegations,
            audit_repository,
            notifier,
        }
    }

    /// Returns the catalog permissions ordered by code.
    #[must_use]
    pub fn list_permissions(&self) -> Vec<PermissionDefinition> {
        self.catalog.list_permissions()
    }

    /// Returns the catalog roles ordered by identifier.
    #[must_use]
    pub fn list_roles(&self) -> Vec<RoleDefinition> {
        self.catalog.list_roles()
    }

    /// Returns the validation check catalog.
    #[must_use]
    pub fn list_checks(&self) -> &[CheckDefinition] {
        self.catalog.list_checks()
    }

    async fn require(&self, actor: &UserIdentity, permission: &PermissionCode) -> AppResult<()> {
        self.authorization_service
            .require_permission(actor, permission)
            .await
            .map(|_| ())
    }

    async fn require_self_or(
        &self,
        actor: &UserIdentity,
        subject: &str,
        permission: &PermissionCode,
    ) -> AppResult<()> {
        if actor.subject() == subject {
            return Ok(());
        }

        self.require(actor, permission).await
    }

    async fn dispatch(&self, notification: AccessNotification) {
        let kind = notification.kind;
        let tenant_id = notification.tenant_id;
        if let Err(error) = self.notifier.notify(notification).await {
            warn!(
                tenant_id = %tenant_id,
                kind = kind.as_str(),
                error = %error,
                "access notification dispatch failed"
            );
        }
    }
}

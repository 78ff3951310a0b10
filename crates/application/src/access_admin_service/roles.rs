use super::*;

use accessledger_core::NonEmptyString;
use accessledger_domain::{AuditAction, RoleAssignment};
use chrono::Utc;
use tracing::info;

use crate::{
    AccessNotificationKind, AuditEvent, AuditLogEntry, AuditLogQuery, RoleAssignmentQuery,
};

impl AccessAdminService {
    /// Assigns a catalog role to a subject.
    ///
    /// A subject already holding the role actively is rejected with
    /// `AppError::Conflict`.
    pub async fn assign_role(
        &self,
        actor: &UserIdentity,
        subject: &str,
        role_id: &str,
    ) -> AppResult<RoleAssignment> {
        self.require(actor, &self.catalog.guards().roles_manage)
            .await?;

        let subject = NonEmptyString::new(subject)?;
        let role = self.catalog.role(role_id)?;
        let assignment = RoleAssignment::new_active(
            subject.as_str(),
            role.role_id.clone(),
            actor.subject(),
            Utc::now(),
        );

        self.assignments
            .insert_active_assignment(actor.tenant_id(), assignment.clone())
            .await?;
        self.authorization_service
            .invalidate_subject(actor.tenant_id(), subject.as_str())
            .await;

        info!(
            tenant_id = %actor.tenant_id(),
            subject = subject.as_str(),
            role_id = role.role_id.as_str(),
            assigned_by = actor.subject(),
            "role assigned"
        );

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id: actor.tenant_id(),
                subject: actor.subject().to_owned(),
                action: AuditAction::SecurityRoleAssigned,
                resource_type: "role_assignment".to_owned(),
                resource_id: assignment.assignment_id.to_string(),
                detail: Some(format!(
                    "assigned role '{}' to '{}'",
                    role.role_id,
                    subject.as_str()
                )),
            })
            .await?;

        self.dispatch(AccessNotification {
            tenant_id: actor.tenant_id(),
            kind: AccessNotificationKind::RoleAssigned,
            actor: actor.subject().to_owned(),
            recipients: vec![assignment.subject.clone()],
            resource_id: assignment.assignment_id.to_string(),
            detail: format!("role '{}' assigned", role.role_id),
            occurred_at: assignment.assigned_at,
        })
        .await;

        Ok(assignment)
    }

    /// Deactivates the active assignment of a role.
    ///
    /// Fails with `AppError::NotFound` when the subject does not actively hold
    /// the role.
    pub async fn revoke_role(
        &self,
        actor: &UserIdentity,
        subject: &str,
        role_id: &str,
    ) -> AppResult<RoleAssignment> {
        self.require(actor, &self.catalog.guards().roles_manage)
            .await?;

        let role = self.catalog.role(role_id)?;
        let assignment = self
            .assignments
            .deactivate_assignment(
                actor.tenant_id(),
                subject,
                &role.role_id,
                actor.subject(),
                Utc::now(),
            )
            .await?;
        self.authorization_service
            .invalidate_subject(actor.tenant_id(), subject)
            .await;

        info!(
            tenant_id = %actor.tenant_id(),
            subject = subject,
            role_id = role.role_id.as_str(),
            revoked_by = actor.subject(),
            "role revoked"
        );

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id: actor.tenant_id(),
                subject: actor.subject().to_owned(),
                action: AuditAction::SecurityRoleRevoked,
                resource_type: "role_assignment".to_owned(),
                resource_id: assignment.assignment_id.to_string(),
                detail: Some(format!("revoked role '{}' from '{subject}'", role.role_id)),
            })
            .await?;

        self.dispatch(AccessNotification {
            tenant_id: actor.tenant_id(),
            kind: AccessNotificationKind::RoleRevoked,
            actor: actor.subject().to_owned(),
            recipients: vec![assignment.subject.clone()],
            resource_id: assignment.assignment_id.to_string(),
            detail: format!("role '{}' revoked", role.role_id),
            occurred_at: assignment.revoked_at.unwrap_or_else(Utc::now),
        })
        .await;

        Ok(assignment)
    }

    /// Lists the active roles of a subject. Reading your own roles needs no guard.
    pub async fn list_active_roles(
        &self,
        actor: &UserIdentity,
        subject: &str,
    ) -> AppResult<Vec<RoleAssignment>> {
        self.require_self_or(actor, subject, &self.catalog.guards().roles_manage)
            .await?;

        self.assignments
            .list_active_assignments(actor.tenant_id(), subject)
            .await
    }

    /// Lists assignments for audit dashboards, including revoked ones on request.
    pub async fn list_role_assignments(
        &self,
        actor: &UserIdentity,
        query: RoleAssignmentQuery,
    ) -> AppResult<Vec<RoleAssignment>> {
        self.require(actor, &self.catalog.guards().roles_manage)
            .await?;

        self.assignments
            .list_assignments(actor.tenant_id(), query)
            .await
    }

    /// Reads the tenant's audit trail, newest first.
    pub async fn list_audit_trail(
        &self,
        actor: &UserIdentity,
        query: AuditLogQuery,
    ) -> AppResult<Vec<AuditLogEntry>> {
        self.require(actor, &self.catalog.guards().roles_manage)
            .await?;

        self.audit_repository
            .list_recent_events(actor.tenant_id(), query)
            .await
    }
}

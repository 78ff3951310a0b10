use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use accessledger_core::{AppError, AppResult, TenantId, UserIdentity};
use accessledger_domain::{
    DelegationParty, DelegationRule, PermissionCatalog, RoleAssignment, RoleId,
};

use crate::{
    AccessEventNotifier, AccessNotification, AuditEvent, AuditLogEntry, AuditLogQuery,
    AuditRepository, DelegationRepository, DelegationRevocation, GrantSnapshot,
    GrantSnapshotCache, GrantSnapshotRepository, RoleAssignmentQuery, RoleAssignmentRepository,
    TenantDelegation,
};

pub(crate) const CATALOG: &str = r#"{
    "version": "2024-06",
    "permissions": [
        {"code": "challenges_view"},
        {"code": "challenges_edit"},
        {"code": "challenges_delete"},
        {"code": "roles_manage"},
        {"code": "delegations_manage"},
        {"code": "validation_read"},
        {"code": "validation_write"},
        {"code": "validation_reset"}
    ],
    "roles": [
        {"role_id": "staff", "display_name": "Staff", "permissions": ["challenges_view"]},
        {"role_id": "editor", "display_name": "Editor", "permissions": ["challenges_view", "challenges_edit"]},
        {"role_id": "auditor", "display_name": "Auditor", "permissions": ["validation_read", "validation_write"]},
        {"role_id": "security_officer", "display_name": "Security officer", "permissions": ["roles_manage", "delegations_manage"]},
        {"role_id": "admin", "display_name": "Administrator", "grants_all": true}
    ],
    "checks": [
        {"category_id": "security", "check_id": "sec-01"},
        {"category_id": "security", "check_id": "sec-02"},
        {"category_id": "privacy", "check_id": "prv-01"}
    ],
    "guards": {
        "roles_manage": "roles_manage",
        "delegations_manage": "delegations_manage",
        "checklist_read": "validation_read",
        "checklist_write": "validation_write",
        "checklist_reset": "validation_reset"
    }
}"#;

pub(crate) fn catalog() -> Arc<PermissionCatalog> {
    Arc::new(PermissionCatalog::from_json(CATALOG).unwrap_or_else(|error| panic!("{error}")))
}

pub(crate) fn actor(tenant_id: TenantId, subject: &str) -> UserIdentity {
    UserIdentity::new(subject, tenant_id)
}

pub(crate) fn role_id(value: &str) -> RoleId {
    RoleId::new(value).unwrap_or_else(|error| panic!("{error}"))
}

#[derive(Default)]
pub(crate) struct FakeGrantStore {
    pub(crate) assignments: Mutex<Vec<(TenantId, RoleAssignment)>>,
    pub(crate) delegations: Mutex<Vec<(TenantId, DelegationRule)>>,
    pub(crate) snapshot_reads: Mutex<u32>,
}

impl FakeGrantStore {
    pub(crate) async fn seed_role(&self, tenant_id: TenantId, subject: &str, role: &str) {
        self.assignments.lock().await.push((
            tenant_id,
            RoleAssignment::new_active(subject, role_id(role), "seed", Utc::now()),
        ));
    }

    pub(crate) async fn seed_delegation(&self, tenant_id: TenantId, rule: DelegationRule) {
        self.delegations.lock().await.push((tenant_id, rule));
    }
}

#[async_trait]
impl GrantSnapshotRepository for FakeGrantStore {
    async fn load_grant_snapshot(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<GrantSnapshot> {
        *self.snapshot_reads.lock().await += 1;

        let active_assignments = self
            .assignments
            .lock()
            .await
            .iter()
            .filter(|(stored_tenant_id, assignment)| {
                *stored_tenant_id == tenant_id && assignment.subject == subject && assignment.is_active
            })
            .map(|(_, assignment)| assignment.clone())
            .collect();
        let incoming_delegations = self
            .delegations
            .lock()
            .await
            .iter()
            .filter(|(stored_tenant_id, rule)| {
                *stored_tenant_id == tenant_id && rule.delegate == subject && rule.is_active
            })
            .map(|(_, rule)| rule.clone())
            .collect();

        Ok(GrantSnapshot {
            subject: subject.to_owned(),
            active_assignments,
            incoming_delegations,
        })
    }
}

#[async_trait]
impl RoleAssignmentRepository for FakeGrantStore {
    async fn insert_active_assignment(
        &self,
        tenant_id: TenantId,
        assignment: RoleAssignment,
    ) -> AppResult<()> {
        let mut assignments = self.assignments.lock().await;
        if assignments.iter().any(|(stored_tenant_id, stored)| {
            *stored_tenant_id == tenant_id
                && stored.is_active
                && stored.subject == assignment.subject
                && stored.role_id == assignment.role_id
        }) {
            return Err(AppError::Conflict(format!(
                "subject '{}' already holds role '{}'",
                assignment.subject, assignment.role_id
            )));
        }

        assignments.push((tenant_id, assignment));
        Ok(())
    }

    async fn deactivate_assignment(
        &self,
        tenant_id: TenantId,
        subject: &str,
        role_id: &RoleId,
        revoked_by: &str,
        revoked_at: DateTime<Utc>,
    ) -> AppResult<RoleAssignment> {
        let mut assignments = self.assignments.lock().await;
        let (_, assignment) = assignments
            .iter_mut()
            .find(|(stored_tenant_id, stored)| {
                *stored_tenant_id == tenant_id
                    && stored.is_active
                    && stored.subject == subject
                    && &stored.role_id == role_id
            })
            .ok_or_else(|| {
                AppError::NotFound(format!("subject '{subject}' does not hold role '{role_id}'"))
            })?;

        assignment.deactivate(revoked_by, revoked_at);
        Ok(assignment.clone())
    }

    async fn list_active_assignments(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .assignments
            .lock()
            .await
            .iter()
            .filter(|(stored_tenant_id, assignment)| {
                *stored_tenant_id == tenant_id && assignment.subject == subject && assignment.is_active
            })
            .map(|(_, assignment)| assignment.clone())
            .collect())
    }

    async fn list_assignments(
        &self,
        tenant_id: TenantId,
        query: RoleAssignmentQuery,
    ) -> AppResult<Vec<RoleAssignment>> {
        let mut assignments: Vec<RoleAssignment> = self
            .assignments
            .lock()
            .await
            .iter()
            .filter(|(stored_tenant_id, assignment)| {
                *stored_tenant_id == tenant_id
                    && (query.include_inactive || assignment.is_active)
                    && query
                        .subject
                        .as_deref()
                        .is_none_or(|subject| assignment.subject == subject)
            })
            .map(|(_, assignment)| assignment.clone())
            .collect();
        assignments.reverse();

        Ok(assignments
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }
}

#[async_trait]
impl DelegationRepository for FakeGrantStore {
    async fn insert_delegation(&self, tenant_id: TenantId, rule: DelegationRule) -> AppResult<()> {
        self.delegations.lock().await.push((tenant_id, rule));
        Ok(())
    }

    async fn find_delegation(
        &self,
        tenant_id: TenantId,
        delegation_id: Uuid,
    ) -> AppResult<Option<DelegationRule>> {
        Ok(self
            .delegations
            .lock()
            .await
            .iter()
            .find(|(stored_tenant_id, rule)| {
                *stored_tenant_id == tenant_id && rule.delegation_id == delegation_id
            })
            .map(|(_, rule)| rule.clone()))
    }

    async fn revoke_delegation(
        &self,
        tenant_id: TenantId,
        delegation_id: Uuid,
        revoked_by: &str,
        revoked_at: DateTime<Utc>,
    ) -> AppResult<DelegationRevocation> {
        let mut delegations = self.delegations.lock().await;
        let (_, rule) = delegations
            .iter_mut()
            .find(|(stored_tenant_id, rule)| {
                *stored_tenant_id == tenant_id && rule.delegation_id == delegation_id
            })
            .ok_or_else(|| {
                AppError::NotFound(format!("delegation '{delegation_id}' was not found"))
            })?;

        if rule.revoke(revoked_by, revoked_at) {
            Ok(DelegationRevocation::Revoked(rule.clone()))
        } else {
            Ok(DelegationRevocation::AlreadyInactive(rule.clone()))
        }
    }

    async fn list_delegations_for(
        &self,
        tenant_id: TenantId,
        subject: &str,
        party: DelegationParty,
    ) -> AppResult<Vec<DelegationRule>> {
        let mut rules: Vec<DelegationRule> = self
            .delegations
            .lock()
            .await
            .iter()
            .filter(|(stored_tenant_id, rule)| {
                *stored_tenant_id == tenant_id && rule.involves(subject, party)
            })
            .map(|(_, rule)| rule.clone())
            .collect();
        rules.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(rules)
    }

    async fn list_expired_active_delegations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<TenantDelegation>> {
        Ok(self
            .delegations
            .lock()
            .await
            .iter()
            .filter(|(_, rule)| rule.is_expired_but_active(now))
            .take(limit)
            .map(|(tenant_id, rule)| TenantDelegation {
                tenant_id: *tenant_id,
                rule: rule.clone(),
            })
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditRepository {
    pub(crate) events: Mutex<Vec<AuditEvent>>,
}

#[async_trait]
impl AuditRepository for FakeAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        self.events.lock().await.push(event);
        Ok(())
    }

    async fn list_recent_events(
        &self,
        tenant_id: TenantId,
        query: AuditLogQuery,
    ) -> AppResult<Vec<AuditLogEntry>> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .rev()
            .filter(|event| event.tenant_id == tenant_id && query.matches(event))
            .take(query.limit)
            .map(|event| AuditLogEntry {
                event: event.clone(),
                recorded_at: Utc::now(),
            })
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct FakeNotifier {
    pub(crate) notifications: Mutex<Vec<AccessNotification>>,
    pub(crate) fail: bool,
}

#[async_trait]
impl AccessEventNotifier for FakeNotifier {
    async fn notify(&self, notification: AccessNotification) -> AppResult<()> {
        if self.fail {
            return Err(AppError::Internal("dispatcher unavailable".to_owned()));
        }

        self.notifications.lock().await.push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeSnapshotCache {
    pub(crate) entries: Mutex<HashMap<(TenantId, String), GrantSnapshot>>,
    pub(crate) fail_reads: bool,
}

#[async_trait]
impl GrantSnapshotCache for FakeSnapshotCache {
    async fn get_snapshot(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Option<GrantSnapshot>> {
        if self.fail_reads {
            return Err(AppError::Internal("cache unavailable".to_owned()));
        }

        Ok(self
            .entries
            .lock()
            .await
            .get(&(tenant_id, subject.to_owned()))
            .cloned())
    }

    async fn set_snapshot(
        &self,
        tenant_id: TenantId,
        snapshot: &GrantSnapshot,
        _ttl_seconds: u32,
    ) -> AppResult<()> {
        self.entries
            .lock()
            .await
            .insert((tenant_id, snapshot.subject.clone()), snapshot.clone());
        Ok(())
    }

    async fn invalidate_subject(&self, tenant_id: TenantId, subject: &str) -> AppResult<()> {
        self.entries
            .lock()
            .await
            .remove(&(tenant_id, subject.to_owned()));
        Ok(())
    }
}

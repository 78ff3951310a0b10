
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use accessledger_application::{
    DelegationRepository, DelegationRevocation, GrantSnapshot, GrantSnapshotRepository,
    RoleAssignmentQuery, RoleAssignmentRepository, TenantDelegation,
};
use accessledger_core::{AppError, AppResult, TenantId};
use accessledger_domain::{DelegationParty, DelegationRule, RoleAssignment, RoleId};

#[derive(Debug, Default)]
struct AccessState {
    assignments: Vec<(TenantId, RoleAssignment)>,
    delegations: Vec<(TenantId, DelegationRule)>,
}

/// In-memory role assignment and delegation store.
///
/// Both tables live behind one lock, so a grant snapshot never mixes
/// assignment and delegation reads from different writes.
#[derive(Debug, Default)]
pub struct InMemoryAccessRepository {
    state: RwLock<AccessState>,
}

impl InMemoryAccessRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleAssignmentRepository for InMemoryAccessRepository {
    async fn insert_active_assignment(
        &self,
        tenant_id: TenantId,
        assignment: RoleAssignment,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;

        let duplicate = state.assignments.iter().any(|(stored_tenant_id, stored)| {
            stored_tenant_id == &tenant_id
                && stored.is_active
                && stored.subject == assignment.subject
                && stored.role_id == assignment.role_id
        });
        if duplicate {
            return Err(AppError::Conflict(format!(
                "subject '{}' already holds role '{}'",
                assignment.subject,
                assignment.role_id.as_str()
            )));
        }

        state.assignments.push((tenant_id, assignment));
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
        let mut state = self.state.write().await;

        let (_, assignment) = state
            .assignments
            .iter_mut()
            .find(|(stored_tenant_id, stored)| {
                stored_tenant_id == &tenant_id
                    && stored.is_active
                    && stored.subject == subject
                    && &stored.role_id == role_id
            })
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "subject '{subject}' has no active assignment of role '{}'",
                    role_id.as_str()
                ))
            })?;

        assignment.deactivate(revoked_by, revoked_at);
        Ok(assignment.clone())
    }

    async fn list_active_assignments(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Vec<RoleAssignment>> {
        let state = self.state.read().await;

        let mut assignments: Vec<RoleAssignment> = state
            .assignments
            .iter()
            .filter(|(stored_tenant_id, stored)| {
                stored_tenant_id == &tenant_id && stored.is_active && stored.subject == subject
            })
            .map(|(_, stored)| stored.clone())
            .collect();
        assignments.sort_by(|left, right| left.role_id.cmp(&right.role_id));

        Ok(assignments)
    }

    async fn list_assignments(
        &self,
        tenant_id: TenantId,
        query: RoleAssignmentQuery,
    ) -> AppResult<Vec<RoleAssignment>> {
        let state = self.state.read().await;

        let mut assignments: Vec<RoleAssignment> = state
            .assignments
            .iter()
            .filter(|(stored_tenant_id, stored)| {
                stored_tenant_id == &tenant_id
                    && (query.include_inactive || stored.is_active)
                    && query
                        .subject
                        .as_deref()
                        .is_none_or(|subject| stored.subject == subject)
            })
            .map(|(_, stored)| stored.clone())
            .collect();
        assignments.sort_by(|left, right| right.assigned_at.cmp(&left.assigned_at));

        Ok(assignments
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }
}

#[async_trait]
impl DelegationRepository for InMemoryAccessRepository {
    async fn insert_delegation(&self, tenant_id: TenantId, rule: DelegationRule) -> AppResult<()> {
        let mut state = self.state.write().await;

        if state
            .delegations
            .iter()
            .any(|(_, stored)| stored.delegation_id == rule.delegation_id)
        {
            return Err(AppError::Conflict(format!(
                "delegation '{}' already exists",
                rule.delegation_id
            )));
        }

        state.delegations.push((tenant_id, rule));
        Ok(())
    }

    async fn find_delegation(
        &self,
        tenant_id: TenantId,
        delegation_id: Uuid,
    ) -> AppResult<Option<DelegationRule>> {
        Ok(self
            .state
            .read()
            .await
            .delegations
            .iter()
            .find(|(stored_tenant_id, stored)| {
                stored_tenant_id == &tenant_id && stored.delegation_id == delegation_id
            })
            .map(|(_, stored)| stored.clone()))
    }

    async fn revoke_delegation(
        &self,
        tenant_id: TenantId,
        delegation_id: Uuid,
        revoked_by: &str,
        revoked_at: DateTime<Utc>,
    ) -> AppResult<DelegationRevocation> {
        let mut state = self.state.write().await;

        let (_, rule) = state
            .delegations
            .iter_mut()
            .find(|(stored_tenant_id, stored)| {
                stored_tenant_id == &tenant_id && stored.delegation_id == delegation_id
            })
            .ok_or_else(|| AppError::NotFound(format!("delegation '{delegation_id}' was not found")))?;

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
        let state = self.state.read().await;

        let mut rules: Vec<DelegationRule> = state
            .delegations
            .iter()
            .filter(|(stored_tenant_id, stored)| {
                stored_tenant_id == &tenant_id && stored.involves(subject, party)
            })
            .map(|(_, stored)| stored.clone())
            .collect();
        rules.sort_by(|left, right| right.created_at.cmp(&left.created_at));

        Ok(rules)
    }

    async fn list_expired_active_delegations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<TenantDelegation>> {
        let state = self.state.read().await;

        let mut expired: Vec<TenantDelegation> = state
            .delegations
            .iter()
            .filter(|(_, stored)| stored.is_expired_but_active(now))
            .map(|(tenant_id, stored)| TenantDelegation {
                tenant_id: *tenant_id,
                rule: stored.clone(),
            })
            .collect();
        expired.sort_by(|left, right| left.rule.window.ends_at().cmp(&right.rule.window.ends_at()));
        expired.truncate(limit);

        Ok(expired)
    }
}

#[async_trait]
impl GrantSnapshotRepository for InMemoryAccessRepository {
    async fn load_grant_snapshot(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<GrantSnapshot> {
        let state = self.state.read().await;

        Ok(GrantSnapshot {
            subject: subject.to_owned(),
            active_assignments: state
                .assignments
                .iter()
                .filter(|(stored_tenant_id, stored)| {
                    stored_tenant_id == &tenant_id && stored.is_active && stored.subject == subject
                })
                .map(|(_, stored)| stored.clone())
                .collect(),
            incoming_delegations: state
                .delegations
                .iter()
                .filter(|(stored_tenant_id, stored)| {
                    stored_tenant_id == &tenant_id && stored.is_active && stored.delegate == subject
                })
                .map(|(_, stored)| stored.clone())
                .collect(),
        })
    }
}

mod decisions;
mod effective;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use accessledger_core::{AppResult, TenantId, UserIdentity};
use accessledger_domain::{PermissionCatalog, RoleId};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{AuditRepository, GrantSnapshot, GrantSnapshotCache, GrantSnapshotRepository};

pub use decisions::{AccessDecision, AdminOverrideSource, DecisionBasis};
pub use effective::{EffectivePermissionSet, PermissionSource};

/// Resolves effective permissions and answers authorization checks.
#[derive(Clone)]
pub struct AuthorizationService {
    catalog: Arc<PermissionCatalog>,
    repository: Arc<dyn GrantSnapshotRepository>,
    audit_repository: Arc<dyn AuditRepository>,
    snapshot_cache: Option<SnapshotCacheConfig>,
}

#[derive(Clone)]
struct SnapshotCacheConfig {
    cache: Arc<dyn GrantSnapshotCache>,
    ttl_seconds: u32,
}

impl AuthorizationService {
    /// Creates a new authorization service from its collaborators.
    #[must_use]
    pub fn new(
        catalog: Arc<PermissionCatalog>,
        repository: Arc<dyn GrantSnapshotRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            catalog,
            repository,
            audit_repository,
            snapshot_cache: None,
        }
    }

    /// Enables short-lived grant snapshot caching. A zero ttl disables it.
    #[must_use]
    pub fn with_snapshot_cache(mut self, cache: Arc<dyn GrantSnapshotCache>, ttl_seconds: u32) -> Self {
        self.snapshot_cache =
            (ttl_seconds > 0).then_some(SnapshotCacheConfig { cache, ttl_seconds });
        self
    }

    /// Returns the permission catalog the service resolves against.
    #[must_use]
    pub fn catalog(&self) -> &PermissionCatalog {
        self.catalog.as_ref()
    }

    /// Computes the effective permission set of a subject at `now`.
    pub async fn resolve(
        &self,
        tenant_id: TenantId,
        subject: &str,
        now: DateTime<Utc>,
    ) -> AppResult<EffectivePermissionSet> {
        let snapshot = self.load_snapshot(tenant_id, subject).await?;
        Ok(EffectivePermissionSet::from_snapshot(
            self.catalog.as_ref(),
            &snapshot,
            now,
        ))
    }

    /// The single admin bypass predicate.
    ///
    /// A subject is an administrator when the identity provider says so or
    /// when it holds an active assignment of a role carrying the
    /// all-permissions marker.
    pub async fn is_admin_override(
        &self,
        actor: &UserIdentity,
    ) -> AppResult<Option<AdminOverrideSource>> {
        let snapshot = self.load_snapshot(actor.tenant_id(), actor.subject()).await?;
        Ok(self.admin_override_for(actor, &snapshot))
    }

    /// Drops any cached grants of a subject. Called after every grant mutation.
    pub async fn invalidate_subject(&self, tenant_id: TenantId, subject: &str) {
        let Some(config) = &self.snapshot_cache else {
            return;
        };

        if let Err(error) = config.cache.invalidate_subject(tenant_id, subject).await {
            warn!(
                tenant_id = %tenant_id,
                subject = subject,
                error = %error,
                "failed to invalidate grant snapshot cache entry"
            );
        }
    }

    fn admin_override_for(
        &self,
        actor: &UserIdentity,
        snapshot: &GrantSnapshot,
    ) -> Option<AdminOverrideSource> {
        if actor.is_platform_admin() {
            return Some(AdminOverrideSource::IdentityProvider);
        }

        self.admin_role_in(snapshot)
            .map(|role_id| AdminOverrideSource::Role { role_id })
    }

    fn admin_role_in(&self, snapshot: &GrantSnapshot) -> Option<RoleId> {
        snapshot
            .active_assignments
            .iter()
            .filter(|assignment| assignment.is_active)
            .find(|assignment| {
                self.catalog
                    .find_role(&assignment.role_id)
                    .is_some_and(|role| role.grants_all)
            })
            .map(|assignment| assignment.role_id.clone())
    }

    async fn load_snapshot(&self, tenant_id: TenantId, subject: &str) -> AppResult<GrantSnapshot> {
        let Some(config) = &self.snapshot_cache else {
            return self.repository.load_grant_snapshot(tenant_id, subject).await;
        };

        match config.cache.get_snapshot(tenant_id, subject).await {
            Ok(Some(snapshot)) => return Ok(snapshot),
            Ok(None) => {}
            Err(error) => {
                warn!(
                    tenant_id = %tenant_id,
                    subject = subject,
                    error = %error,
                    "grant snapshot cache read failed, falling back to repository"
                );
            }
        }

        let snapshot = self.repository.load_grant_snapshot(tenant_id, subject).await?;
        if let Err(error) = config
            .cache
            .set_snapshot(tenant_id, &snapshot, config.ttl_seconds)
            .await
        {
            warn!(
                tenant_id = %tenant_id,
                subject = subject,
                error = %error,
                "failed to store grant snapshot in cache"
            );
        }

        Ok(snapshot)
    }
}

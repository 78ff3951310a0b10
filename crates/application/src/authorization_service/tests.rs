use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use accessledger_core::{AppError, TenantId};
use accessledger_domain::{AuditAction, DelegationRule, DelegationWindow, PermissionCode};

use crate::test_support::{
    FakeAuditRepository, FakeGrantStore, FakeSnapshotCache, actor, catalog, role_id,
};

use super::{AdminOverrideSource, AuthorizationService, DecisionBasis, PermissionSource};

fn code(value: &str) -> PermissionCode {
    PermissionCode::new(value).unwrap_or_else(|error| panic!("{error}"))
}

fn delegation(
    delegator: &str,
    delegate: &str,
    codes: &[&str],
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> DelegationRule {
    DelegationRule {
        delegation_id: Uuid::new_v4(),
        delegator: delegator.to_owned(),
        delegate: delegate.to_owned(),
        permissions: codes.iter().map(|value| code(value)).collect(),
        window: DelegationWindow::new(starts_at, ends_at).unwrap_or_else(|error| panic!("{error}")),
        reason: "holiday cover".to_owned(),
        is_active: true,
        created_by: delegator.to_owned(),
        created_at: starts_at,
        revoked_at: None,
        revoked_by: None,
    }
}

fn service(store: Arc<FakeGrantStore>, audit: Arc<FakeAuditRepository>) -> AuthorizationService {
    AuthorizationService::new(catalog(), store, audit)
}

#[tokio::test]
async fn resolve_unions_roles_and_valid_delegations() {
    let tenant_id = TenantId::new();
    let now = Utc::now();
    let store = Arc::new(FakeGrantStore::default());
    store.seed_role(tenant_id, "bob", "staff").await;
    store.seed_role(tenant_id, "bob", "auditor").await;
    store
        .seed_delegation(
            tenant_id,
            delegation(
                "carol",
                "bob",
                &["challenges_edit"],
                now - Duration::hours(1),
                now + Duration::hours(1),
            ),
        )
        .await;
    let service = service(store, Arc::new(FakeAuditRepository::default()));

    let effective = service
        .resolve(tenant_id, "bob", now)
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    let expected: BTreeSet<PermissionCode> = [
        "challenges_view",
        "challenges_edit",
        "validation_read",
        "validation_write",
    ]
    .into_iter()
    .map(code)
    .collect();
    assert_eq!(effective.codes(), expected);
    assert_eq!(effective.subject(), "bob");
    assert_eq!(effective.evaluated_at(), now);
    assert!(!effective.direct_codes().contains(&code("challenges_edit")));
    assert!(
        effective
            .sources(&code("challenges_edit"))
            .is_some_and(|sources| sources
                .iter()
                .all(|source| matches!(source, PermissionSource::Delegated { .. })))
    );
}

#[tokio::test]
async fn resolve_ignores_delegations_outside_their_window() {
    let tenant_id = TenantId::new();
    let now = Utc::now();
    let store = Arc::new(FakeGrantStore::default());
    store
        .seed_delegation(
            tenant_id,
            delegation(
                "carol",
                "bob",
                &["challenges_edit"],
                now - Duration::minutes(10),
                now - Duration::minutes(1),
            ),
        )
        .await;
    store
        .seed_delegation(
            tenant_id,
            delegation(
                "carol",
                "bob",
                &["challenges_view"],
                now - Duration::minutes(1),
                now + Duration::minutes(10),
            ),
        )
        .await;
    let service = service(store, Arc::new(FakeAuditRepository::default()));

    let effective = service
        .resolve(tenant_id, "bob", now)
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(!effective.contains(&code("challenges_edit")));
    assert!(effective.contains(&code("challenges_view")));
}

#[tokio::test]
async fn resolve_is_scoped_to_tenant() {
    let tenant_id = TenantId::new();
    let store = Arc::new(FakeGrantStore::default());
    store.seed_role(tenant_id, "bob", "staff").await;
    let service = service(store, Arc::new(FakeAuditRepository::default()));

    let effective = service
        .resolve(TenantId::new(), "bob", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(effective.codes().is_empty());
}

#[tokio::test]
async fn revoked_delegation_stops_granting_immediately() {
    let tenant_id = TenantId::new();
    let now = Utc::now();
    let store = Arc::new(FakeGrantStore::default());
    let mut rule = delegation(
        "carol",
        "bob",
        &["challenges_edit"],
        now - Duration::hours(1),
        now + Duration::hours(1),
    );
    assert!(rule.revoke("carol", now));
    store.seed_delegation(tenant_id, rule).await;
    let service = service(store, Arc::new(FakeAuditRepository::default()));

    let decision = service
        .has_permission(&actor(tenant_id, "bob"), "challenges_edit", now)
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(!decision.granted);
    assert_eq!(decision.basis, DecisionBasis::Denied);
}

#[tokio::test]
async fn direct_grant_reports_granting_roles() {
    let tenant_id = TenantId::new();
    let store = Arc::new(FakeGrantStore::default());
    store.seed_role(tenant_id, "bob", "staff").await;
    store.seed_role(tenant_id, "bob", "editor").await;
    let audit = Arc::new(FakeAuditRepository::default());
    let service = service(store, audit.clone());

    let decision = service
        .has_permission(&actor(tenant_id, "bob"), "challenges_view", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(decision.granted);
    assert_eq!(
        decision.basis,
        DecisionBasis::Direct {
            role_ids: [role_id("editor"), role_id("staff")].into_iter().collect(),
        }
    );
    assert!(audit.events.lock().await.is_empty());
}

#[tokio::test]
async fn delegated_grant_is_audited() {
    let tenant_id = TenantId::new();
    let now = Utc::now();
    let store = Arc::new(FakeGrantStore::default());
    let rule = delegation(
        "carol",
        "bob",
        &["challenges_edit"],
        now - Duration::hours(1),
        now + Duration::hours(1),
    );
    let delegation_id = rule.delegation_id;
    store.seed_delegation(tenant_id, rule).await;
    let audit = Arc::new(FakeAuditRepository::default());
    let service = service(store, audit.clone());

    let decision = service
        .has_permission(&actor(tenant_id, "bob"), "challenges_edit", now)
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(decision.granted);
    assert_eq!(
        decision.basis,
        DecisionBasis::Delegated {
            delegation_ids: [delegation_id].into_iter().collect(),
            delegators: ["carol".to_owned()].into_iter().collect(),
        }
    );
    let events = audit.events.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::SecurityDelegatedPermissionUsed);
    assert_eq!(events[0].resource_id, delegation_id.to_string());
}

#[tokio::test]
async fn identity_provider_admin_bypasses_grants() {
    let tenant_id = TenantId::new();
    let audit = Arc::new(FakeAuditRepository::default());
    let service = service(Arc::new(FakeGrantStore::default()), audit.clone());
    let admin = actor(tenant_id, "root").with_platform_admin(true);

    let decision = service
        .has_permission(&admin, "validation_reset", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(decision.granted);
    assert_eq!(
        decision.basis,
        DecisionBasis::AdminOverride(AdminOverrideSource::IdentityProvider)
    );
    let events = audit.events.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::SecurityAdminOverrideUsed);
}

#[tokio::test]
async fn grants_all_role_is_an_admin_override() {
    let tenant_id = TenantId::new();
    let store = Arc::new(FakeGrantStore::default());
    store.seed_role(tenant_id, "dana", "admin").await;
    let service = service(store, Arc::new(FakeAuditRepository::default()));
    let dana = actor(tenant_id, "dana");

    let decision = service
        .has_permission(&dana, "challenges_delete", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert_eq!(
        decision.basis,
        DecisionBasis::AdminOverride(AdminOverrideSource::Role {
            role_id: role_id("admin"),
        })
    );
    assert_eq!(
        service
            .is_admin_override(&dana)
            .await
            .unwrap_or_else(|error| panic!("{error}")),
        Some(AdminOverrideSource::Role {
            role_id: role_id("admin"),
        })
    );
}

#[tokio::test]
async fn unknown_code_is_rejected_not_denied() {
    let service = service(
        Arc::new(FakeGrantStore::default()),
        Arc::new(FakeAuditRepository::default()),
    );
    let admin = actor(TenantId::new(), "root").with_platform_admin(true);

    let result = service
        .has_permission(&admin, "challenges_launch", Utc::now())
        .await;

    assert!(matches!(result, Err(AppError::UnknownPermission(_))));
}

#[tokio::test]
async fn require_permission_maps_denial_to_forbidden() {
    let service = service(
        Arc::new(FakeGrantStore::default()),
        Arc::new(FakeAuditRepository::default()),
    );

    let result = service
        .require_permission(&actor(TenantId::new(), "bob"), &code("roles_manage"))
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn cached_snapshot_is_reused_until_invalidated() {
    let tenant_id = TenantId::new();
    let store = Arc::new(FakeGrantStore::default());
    store.seed_role(tenant_id, "bob", "staff").await;
    let cache = Arc::new(FakeSnapshotCache::default());
    let service = service(store.clone(), Arc::new(FakeAuditRepository::default()))
        .with_snapshot_cache(cache, 5);

    for _ in 0..3 {
        let effective = service
            .resolve(tenant_id, "bob", Utc::now())
            .await
            .unwrap_or_else(|error| panic!("{error}"));
        assert!(effective.contains(&code("challenges_view")));
    }
    assert_eq!(*store.snapshot_reads.lock().await, 1);

    store.seed_role(tenant_id, "bob", "editor").await;
    service.invalidate_subject(tenant_id, "bob").await;

    let effective = service
        .resolve(tenant_id, "bob", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(effective.contains(&code("challenges_edit")));
    assert_eq!(*store.snapshot_reads.lock().await, 2);
}

#[tokio::test]
async fn failing_cache_falls_back_to_repository() {
    let tenant_id = TenantId::new();
    let store = Arc::new(FakeGrantStore::default());
    store.seed_role(tenant_id, "bob", "staff").await;
    let cache = Arc::new(FakeSnapshotCache {
        fail_reads: true,
        ..FakeSnapshotCache::default()
    });
    let service = service(store, Arc::new(FakeAuditRepository::default()))
        .with_snapshot_cache(cache, 5);

    let decision = service
        .has_permission(&actor(tenant_id, "bob"), "challenges_view", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(decision.granted);
}

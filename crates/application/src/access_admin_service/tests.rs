use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use accessledger_core::{AppError, TenantId, UserIdentity};
use accessledger_domain::{AuditAction, DelegationParty};

use crate::test_support::{
    FakeAuditRepository, FakeGrantStore, FakeNotifier, FakeSnapshotCache, actor, catalog,
};
use crate::{
    AccessNotificationKind, AuditLogQuery, AuthorizationService, CreateDelegationInput,
    DelegationRevocation, RoleAssignmentQuery,
};

use super::AccessAdminService;

struct Harness {
    tenant_id: TenantId,
    store: Arc<FakeGrantStore>,
    audit: Arc<FakeAuditRepository>,
    notifier: Arc<FakeNotifier>,
    authorization: AuthorizationService,
    service: AccessAdminService,
}

impl Harness {
    fn officer(&self) -> UserIdentity {
        actor(self.tenant_id, "officer")
    }

    fn subject(&self, subject: &str) -> UserIdentity {
        actor(self.tenant_id, subject)
    }
}

async fn harness_with(notifier: FakeNotifier) -> Harness {
    let tenant_id = TenantId::new();
    let catalog = catalog();
    let store = Arc::new(FakeGrantStore::default());
    store
        .seed_role(tenant_id, "officer", "security_officer")
        .await;
    let audit = Arc::new(FakeAuditRepository::default());
    let notifier = Arc::new(notifier);
    let authorization = AuthorizationService::new(catalog.clone(), store.clone(), audit.clone())
        .with_snapshot_cache(Arc::new(FakeSnapshotCache::default()), 30);
    let service = AccessAdminService::new(
        catalog,
        authorization.clone(),
        store.clone(),
        store.clone(),
        audit.clone(),
        notifier.clone(),
    );

    Harness {
        tenant_id,
        store,
        audit,
        notifier,
        authorization,
        service,
    }
}

async fn harness() -> Harness {
    harness_with(FakeNotifier::default()).await
}

fn delegation_input(delegator: &str, delegate: &str, codes: &[&str]) -> CreateDelegationInput {
    let now = Utc::now();
    CreateDelegationInput {
        delegator: delegator.to_owned(),
        delegate: delegate.to_owned(),
        permissions: codes.iter().map(|code| (*code).to_owned()).collect(),
        starts_at: now - Duration::seconds(1),
        ends_at: now + Duration::hours(1),
        reason: "holiday cover".to_owned(),
    }
}

#[tokio::test]
async fn assign_role_records_audit_and_notification() {
    let harness = harness().await;

    let assignment = harness
        .service
        .assign_role(&harness.officer(), "alice", "staff")
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(assignment.is_active);
    assert_eq!(assignment.assigned_by, "officer");

    let roles = harness
        .service
        .list_active_roles(&harness.subject("alice"), "alice")
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert_eq!(roles.len(), 1);

    let events = harness.audit.events.lock().await;
    assert!(
        events
            .iter()
            .any(|event| event.action == AuditAction::SecurityRoleAssigned)
    );
    let notifications = harness.notifier.notifications.lock().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, AccessNotificationKind::RoleAssigned);
    assert_eq!(notifications[0].recipients, vec!["alice".to_owned()]);
}

#[tokio::test]
async fn duplicate_active_assignment_conflicts() {
    let harness = harness().await;
    let officer = harness.officer();

    harness
        .service
        .assign_role(&officer, "alice", "staff")
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    let result = harness.service.assign_role(&officer, "alice", "staff").await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn assign_unknown_role_is_not_found() {
    let harness = harness().await;

    let result = harness
        .service
        .assign_role(&harness.officer(), "alice", "pilot")
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn assign_role_requires_guard_permission() {
    let harness = harness().await;

    let result = harness
        .service
        .assign_role(&harness.subject("mallory"), "mallory", "admin")
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert!(harness.store.assignments.lock().await.len() == 1);
}

#[tokio::test]
async fn revoke_role_without_active_assignment_is_not_found() {
    let harness = harness().await;

    let result = harness
        .service
        .revoke_role(&harness.officer(), "alice", "staff")
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn revoke_role_keeps_history_and_drops_permission() {
    let harness = harness().await;
    let officer = harness.officer();
    harness
        .service
        .assign_role(&officer, "alice", "staff")
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    // Warm the snapshot cache before revoking.
    let before = harness
        .authorization
        .has_permission(&harness.subject("alice"), "challenges_view", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(before.granted);

    let revoked = harness
        .service
        .revoke_role(&officer, "alice", "staff")
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(!revoked.is_active);
    assert_eq!(revoked.revoked_by.as_deref(), Some("officer"));

    let after = harness
        .authorization
        .has_permission(&harness.subject("alice"), "challenges_view", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(!after.granted);

    let history = harness
        .service
        .list_role_assignments(
            &officer,
            RoleAssignmentQuery {
                subject: Some("alice".to_owned()),
                include_inactive: true,
                limit: 10,
                offset: 0,
            },
        )
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert_eq!(history.len(), 1);
    assert!(!history[0].is_active);
}

#[tokio::test]
async fn reading_other_subjects_roles_requires_guard() {
    let harness = harness().await;

    let result = harness
        .service
        .list_active_roles(&harness.subject("bob"), "officer")
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn delegation_grants_then_revocation_removes_permission() {
    let harness = harness().await;
    let officer = harness.officer();
    let x = harness.subject("x");
    harness
        .store
        .seed_role(harness.tenant_id, "x", "staff")
        .await;
    harness
        .store
        .seed_role(harness.tenant_id, "y", "editor")
        .await;

    let denied = harness
        .authorization
        .has_permission(&x, "challenges_edit", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(!denied.granted);

    let rule = harness
        .service
        .create_delegation(
            &officer,
            delegation_input("y", "x", &["challenges_edit"]),
            Utc::now(),
        )
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert_eq!(rule.created_by, "officer");

    let granted = harness
        .authorization
        .has_permission(&x, "challenges_edit", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(granted.granted);

    let revocation = harness
        .service
        .revoke_delegation(&officer, rule.delegation_id, Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(revocation.changed());

    let denied_again = harness
        .authorization
        .has_permission(&x, "challenges_edit", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(!denied_again.granted);

    let notifications = harness.notifier.notifications.lock().await;
    let kinds: Vec<_> = notifications.iter().map(|notification| notification.kind).collect();
    assert_eq!(
        kinds,
        vec![
            AccessNotificationKind::DelegationCreated,
            AccessNotificationKind::DelegationRevoked,
        ]
    );
}

#[tokio::test]
async fn delegating_unheld_permission_is_insufficient_grant() {
    let harness = harness().await;
    harness
        .store
        .seed_role(harness.tenant_id, "y", "staff")
        .await;

    let result = harness
        .service
        .create_delegation(
            &harness.subject("y"),
            delegation_input("y", "x", &["challenges_view", "challenges_edit"]),
            Utc::now(),
        )
        .await;

    assert!(matches!(result, Err(AppError::InsufficientGrant(_))));
    assert!(harness.store.delegations.lock().await.is_empty());
}

#[tokio::test]
async fn delegated_permissions_cannot_be_delegated_again() {
    let harness = harness().await;
    harness
        .store
        .seed_role(harness.tenant_id, "y", "editor")
        .await;
    harness
        .service
        .create_delegation(
            &harness.subject("y"),
            delegation_input("y", "x", &["challenges_edit"]),
            Utc::now(),
        )
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    let result = harness
        .service
        .create_delegation(
            &harness.subject("x"),
            delegation_input("x", "z", &["challenges_edit"]),
            Utc::now(),
        )
        .await;

    assert!(matches!(result, Err(AppError::InsufficientGrant(_))));
}

#[tokio::test]
async fn inverted_window_is_invalid_range() {
    let harness = harness().await;
    harness
        .store
        .seed_role(harness.tenant_id, "y", "editor")
        .await;
    let mut input = delegation_input("y", "x", &["challenges_edit"]);
    std::mem::swap(&mut input.starts_at, &mut input.ends_at);

    let result = harness
        .service
        .create_delegation(&harness.subject("y"), input, Utc::now())
        .await;

    assert!(matches!(result, Err(AppError::InvalidRange(_))));
}

#[tokio::test]
async fn unknown_code_in_delegation_is_rejected() {
    let harness = harness().await;

    let result = harness
        .service
        .create_delegation(
            &harness.subject("y"),
            delegation_input("y", "x", &["challenges_fly"]),
            Utc::now(),
        )
        .await;

    assert!(matches!(result, Err(AppError::UnknownPermission(_))));
}

#[tokio::test]
async fn delegating_on_behalf_of_another_requires_guard() {
    let harness = harness().await;
    harness
        .store
        .seed_role(harness.tenant_id, "y", "editor")
        .await;

    let result = harness
        .service
        .create_delegation(
            &harness.subject("x"),
            delegation_input("y", "x", &["challenges_edit"]),
            Utc::now(),
        )
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn revoking_twice_is_a_quiet_no_op() {
    let harness = harness().await;
    let y = harness.subject("y");
    harness
        .store
        .seed_role(harness.tenant_id, "y", "editor")
        .await;
    let rule = harness
        .service
        .create_delegation(&y, delegation_input("y", "x", &["challenges_edit"]), Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    harness
        .service
        .revoke_delegation(&y, rule.delegation_id, Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    let second = harness
        .service
        .revoke_delegation(&y, rule.delegation_id, Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert!(matches!(second, DelegationRevocation::AlreadyInactive(_)));
    let revocation_events = harness
        .audit
        .events
        .lock()
        .await
        .iter()
        .filter(|event| event.action == AuditAction::SecurityDelegationRevoked)
        .count();
    assert_eq!(revocation_events, 1);
}

#[tokio::test]
async fn revoking_missing_delegation_is_not_found() {
    let harness = harness().await;

    let result = harness
        .service
        .revoke_delegation(&harness.officer(), Uuid::new_v4(), Utc::now())
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn notifier_failure_does_not_fail_the_mutation() {
    let harness = harness_with(FakeNotifier {
        fail: true,
        ..FakeNotifier::default()
    })
    .await;

    let result = harness
        .service
        .assign_role(&harness.officer(), "alice", "staff")
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn delegations_list_most_recent_first_per_party() {
    let harness = harness().await;
    let y = harness.subject("y");
    harness
        .store
        .seed_role(harness.tenant_id, "y", "editor")
        .await;
    let now = Utc::now();
    let older = harness
        .service
        .create_delegation(&y, delegation_input("y", "x", &["challenges_view"]), now)
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    let newer = harness
        .service
        .create_delegation(
            &y,
            delegation_input("y", "z", &["challenges_edit"]),
            now + Duration::seconds(1),
        )
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    let given = harness
        .service
        .list_delegations_for(&y, "y", DelegationParty::Delegator)
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    let ids: Vec<_> = given.iter().map(|rule| rule.delegation_id).collect();
    assert_eq!(ids, vec![newer.delegation_id, older.delegation_id]);

    let received = harness
        .service
        .list_delegations_for(&harness.officer(), "x", DelegationParty::Delegate)
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert_eq!(received.len(), 1);
}

#[tokio::test]
async fn expired_active_delegations_are_reported_without_writes() {
    let harness = harness().await;
    let y = harness.subject("y");
    harness
        .store
        .seed_role(harness.tenant_id, "y", "editor")
        .await;
    let rule = harness
        .service
        .create_delegation(&y, delegation_input("y", "x", &["challenges_edit"]), Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    let later = rule.window.ends_at() + Duration::minutes(5);
    let expired = harness
        .service
        .list_expired_active_delegations(later, 10)
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].tenant_id, harness.tenant_id);
    assert!(expired[0].rule.is_active);
}

#[tokio::test]
async fn catalog_reads_expose_configuration() {
    let harness = harness().await;

    assert_eq!(harness.service.list_permissions().len(), 8);
    assert_eq!(harness.service.list_roles().len(), 5);
    assert_eq!(harness.service.list_checks().len(), 3);
}

#[tokio::test]
async fn audit_trail_is_guarded_and_filtered() {
    let harness = harness().await;
    harness
        .service
        .assign_role(&harness.officer(), "dana", "staff")
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    harness
        .service
        .revoke_role(&harness.officer(), "dana", "staff")
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    let query = AuditLogQuery {
        resource_type: Some("role_assignment".to_owned()),
        resource_id: None,
        limit: 10,
    };
    let denied = harness
        .service
        .list_audit_trail(&harness.subject("dana"), query.clone())
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let trail = harness
        .service
        .list_audit_trail(&harness.officer(), query)
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].event.action, AuditAction::SecurityRoleRevoked);
    assert_eq!(trail[1].event.action, AuditAction::SecurityRoleAssigned);
}

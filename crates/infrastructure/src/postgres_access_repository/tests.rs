use std::collections::BTreeSet;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use accessledger_application::{
    DelegationRepository, GrantSnapshotRepository, RoleAssignmentQuery, RoleAssignmentRepository,
};
use accessledger_core::{AppError, TenantId};
use accessledger_domain::{
    DelegationParty, DelegationRule, DelegationWindow, PermissionCode, RoleAssignment, RoleId,
};

use super::PostgresAccessRepository;

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = crate::MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres access tests: {error}");
    }

    Some(pool)
}

fn role(value: &str) -> RoleId {
    RoleId::new(value).unwrap_or_else(|error| panic!("{error}"))
}

fn rule(delegator: &str, delegate: &str, ends_in: Duration) -> DelegationRule {
    let now = Utc::now();
    let permissions: BTreeSet<PermissionCode> = ["challenges_edit"]
        .into_iter()
        .map(|code| PermissionCode::new(code).unwrap_or_else(|error| panic!("{error}")))
        .collect();

    DelegationRule {
        delegation_id: Uuid::new_v4(),
        delegator: delegator.to_owned(),
        delegate: delegate.to_owned(),
        permissions,
        window: DelegationWindow::new(now - Duration::hours(2), now + ends_in)
            .unwrap_or_else(|error| panic!("{error}")),
        reason: "cover".to_owned(),
        is_active: true,
        created_by: delegator.to_owned(),
        created_at: now,
        revoked_at: None,
        revoked_by: None,
    }
}

#[tokio::test]
async fn active_assignment_is_unique_per_subject_and_role() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAccessRepository::new(pool);
    let tenant_id = TenantId::new();

    let first = repository
        .insert_active_assignment(
            tenant_id,
            RoleAssignment::new_active("alice", role("staff"), "admin", Utc::now()),
        )
        .await;
    assert!(first.is_ok());

    let duplicate = repository
        .insert_active_assignment(
            tenant_id,
            RoleAssignment::new_active("alice", role("staff"), "admin", Utc::now()),
        )
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let revoked = repository
        .deactivate_assignment(tenant_id, "alice", &role("staff"), "admin", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(!revoked.is_active);

    let reassigned = repository
        .insert_active_assignment(
            tenant_id,
            RoleAssignment::new_active("alice", role("staff"), "admin", Utc::now()),
        )
        .await;
    assert!(reassigned.is_ok());

    let history = repository
        .list_assignments(
            tenant_id,
            RoleAssignmentQuery {
                subject: Some("alice".to_owned()),
                include_inactive: true,
                limit: 10,
                offset: 0,
            },
        )
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn deactivating_missing_assignment_is_not_found() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAccessRepository::new(pool);
    let result = repository
        .deactivate_assignment(TenantId::new(), "nobody", &role("staff"), "admin", Utc::now())
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn revocation_is_idempotent_and_leaves_snapshot() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAccessRepository::new(pool);
    let tenant_id = TenantId::new();
    let rule = rule("yara", "xavier", Duration::hours(1));
    let delegation_id = rule.delegation_id;
    repository
        .insert_delegation(tenant_id, rule)
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    let snapshot = repository
        .load_grant_snapshot(tenant_id, "xavier")
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert_eq!(snapshot.incoming_delegations.len(), 1);

    let first = repository
        .revoke_delegation(tenant_id, delegation_id, "yara", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(first.changed());
    let second = repository
        .revoke_delegation(tenant_id, delegation_id, "yara", Utc::now())
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(!second.changed());

    let snapshot = repository
        .load_grant_snapshot(tenant_id, "xavier")
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(snapshot.incoming_delegations.is_empty());

    let missing = repository
        .revoke_delegation(tenant_id, Uuid::new_v4(), "yara", Utc::now())
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn delegations_are_listed_by_party_and_expiry() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAccessRepository::new(pool);
    let tenant_id = TenantId::new();
    let expired = rule("yara", "xavier", Duration::hours(-1));
    let expired_id = expired.delegation_id;
    repository
        .insert_delegation(tenant_id, expired)
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    repository
        .insert_delegation(tenant_id, rule("yara", "zoe", Duration::hours(1)))
        .await
        .unwrap_or_else(|error| panic!("{error}"));

    let given = repository
        .list_delegations_for(tenant_id, "yara", DelegationParty::Delegator)
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert_eq!(given.len(), 2);

    let received = repository
        .list_delegations_for(tenant_id, "zoe", DelegationParty::Delegate)
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert_eq!(received.len(), 1);

    let report = repository
        .list_expired_active_delegations(Utc::now(), 10_000)
        .await
        .unwrap_or_else(|error| panic!("{error}"));
    assert!(
        report
            .iter()
            .any(|entry| entry.tenant_id == tenant_id && entry.rule.delegation_id == expired_id)
    );
}

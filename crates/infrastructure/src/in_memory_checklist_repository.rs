
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use accessledger_application::{
    AppliedCheckUpdates, CheckWriteOutcome, CheckWriteResult, ChecklistRepository,
    ChecklistSystemKey, InsertChecksOutcome, ResetSystemOutcome, SummaryReconciliation,
};
use accessledger_core::{AppError, AppResult, TenantId};
use accessledger_domain::{
    CheckUpdate, CheckUpdatePlan, SummaryDelta, ValidationCheck, ValidationSummary,
};

#[derive(Debug)]
struct SystemState {
    checks: BTreeMap<String, ValidationCheck>,
    summary: ValidationSummary,
}

/// In-memory checklist store.
///
/// Each write holds the lock for the whole batch, which gives the same
/// all-or-nothing summary semantics as the transactional store.
#[derive(Debug, Default)]
pub struct InMemoryChecklistRepository {
    systems: RwLock<HashMap<(TenantId, String), SystemState>>,
}

impl InMemoryChecklistRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(tenant_id: TenantId, system_id: &str) -> (TenantId, String) {
    (tenant_id, system_id.to_owned())
}

#[async_trait]
impl ChecklistRepository for InMemoryChecklistRepository {
    async fn count_checks(&self, tenant_id: TenantId, system_id: &str) -> AppResult<u32> {
        let systems = self.systems.read().await;
        let count = systems
            .get(&key(tenant_id, system_id))
            .map_or(0, |state| state.checks.len());

        u32::try_from(count)
            .map_err(|_| AppError::Internal(format!("system '{system_id}' has too many checks")))
    }

    async fn insert_missing_checks(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        checks: Vec<ValidationCheck>,
    ) -> AppResult<InsertChecksOutcome> {
        let mut systems = self.systems.write().await;
        let created_system = !systems.contains_key(&key(tenant_id, system_id));
        let state = systems
            .entry(key(tenant_id, system_id))
            .or_insert_with(|| SystemState {
                checks: BTreeMap::new(),
                summary: ValidationSummary::new(system_id, 0, 0),
            });

        let mut created = 0_u32;
        let mut existing = 0_u32;
        let mut created_applicable = 0_u32;
        for check in checks {
            if state.checks.contains_key(&check.check_id) {
                existing = existing.saturating_add(1);
                continue;
            }

            created = created.saturating_add(1);
            created_applicable =
                created_applicable.saturating_add(u32::from(check.status.is_applicable()));
            state.checks.insert(check.check_id.clone(), check);
        }

        state.summary = if created_system {
            ValidationSummary::observed(system_id, state.checks.values())
        } else {
            ValidationSummary {
                last_validated_at: state.summary.last_validated_at,
                last_validated_by: state.summary.last_validated_by.clone(),
                ..ValidationSummary::new(
                    system_id,
                    state.summary.total_checks.saturating_add(created_applicable),
                    state.summary.completed_checks,
                )
            }
        };

        Ok(InsertChecksOutcome { created, existing })
    }

    async fn apply_check_updates(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        updates: Vec<CheckUpdate>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> AppResult<AppliedCheckUpdates> {
        let mut systems = self.systems.write().await;
        let state = systems.get_mut(&key(tenant_id, system_id)).ok_or_else(|| {
            AppError::NotFound(format!("validation system '{system_id}' is not initialized"))
        })?;

        let mut results = Vec::with_capacity(updates.len());
        let mut applied_delta = SummaryDelta::default();

        for update in updates {
            let Some(current) = state.checks.get_mut(&update.check_id) else {
                results.push(CheckWriteResult {
                    check_id: update.check_id,
                    outcome: CheckWriteOutcome::Missing,
                    check: None,
                });
                continue;
            };

            let outcome = match current.plan_update(&update, actor, at) {
                CheckUpdatePlan::Unchanged => CheckWriteOutcome::Unchanged,
                CheckUpdatePlan::Locked => CheckWriteOutcome::Locked,
                CheckUpdatePlan::Apply {
                    next,
                    delta,
                    overrode_not_applicable,
                } => {
                    *current = next;
                    applied_delta += delta;
                    CheckWriteOutcome::Applied {
                        delta,
                        overrode_not_applicable,
                    }
                }
            };

            results.push(CheckWriteResult {
                check_id: update.check_id,
                outcome,
                check: Some(current.clone()),
            });
        }

        state.summary.apply_delta(applied_delta, actor, at);

        Ok(AppliedCheckUpdates {
            results,
            applied_delta,
            summary: state.summary.clone(),
        })
    }

    async fn delete_system(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<ResetSystemOutcome> {
        let removed = self
            .systems
            .write()
            .await
            .remove(&key(tenant_id, system_id));

        Ok(match removed {
            Some(state) => ResetSystemOutcome {
                deleted_checks: u64::try_from(state.checks.len()).unwrap_or(u64::MAX),
                summary_deleted: true,
            },
            None => ResetSystemOutcome {
                deleted_checks: 0,
                summary_deleted: false,
            },
        })
    }

    async fn find_summary(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<Option<ValidationSummary>> {
        Ok(self
            .systems
            .read()
            .await
            .get(&key(tenant_id, system_id))
            .map(|state| state.summary.clone()))
    }

    async fn list_checks(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<Vec<ValidationCheck>> {
        let systems = self.systems.read().await;
        let mut checks: Vec<ValidationCheck> = systems
            .get(&key(tenant_id, system_id))
            .map(|state| state.checks.values().cloned().collect())
            .unwrap_or_default();
        checks.sort_by(|left, right| {
            (left.category_id.as_str(), left.check_id.as_str())
                .cmp(&(right.category_id.as_str(), right.check_id.as_str()))
        });

        Ok(checks)
    }

    async fn reconcile_summary(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        repair: bool,
    ) -> AppResult<Option<SummaryReconciliation>> {
        let mut systems = self.systems.write().await;
        let Some(state) = systems.get_mut(&key(tenant_id, system_id)) else {
            return Ok(None);
        };

        let stored = state.summary.clone();
        let observed = ValidationSummary {
            last_validated_at: stored.last_validated_at,
            last_validated_by: stored.last_validated_by.clone(),
            ..ValidationSummary::observed(system_id, state.checks.values())
        };

        let repaired = repair && !stored.counters_match(&observed);
        if repaired {
            state.summary = observed.clone();
        }

        Ok(Some(SummaryReconciliation {
            stored,
            observed,
            repaired,
        }))
    }

    async fn list_systems(&self) -> AppResult<Vec<ChecklistSystemKey>> {
        let mut keys: Vec<ChecklistSystemKey> = self
            .systems
            .read()
            .await
            .keys()
            .map(|(tenant_id, system_id)| ChecklistSystemKey {
                tenant_id: *tenant_id,
                system_id: system_id.clone(),
            })
            .collect();
        keys.sort();

        Ok(keys)
    }
}

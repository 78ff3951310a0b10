use super::*;

use accessledger_core::TenantId;
use tracing::warn;

use crate::{ChecklistSystemKey, SummaryReconciliation};

const RECONCILER_SUBJECT: &str = "system:summary-reconciler";

/// Totals of one reconciliation sweep over every system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSweepReport {
    /// Systems scanned.
    pub scanned: u32,
    /// Systems whose stored counters disagreed with their rows.
    pub drifted: u32,
    /// Drifted systems whose summary was overwritten.
    pub repaired: u32,
    /// Systems whose scan failed.
    pub failed: u32,
}

impl ChecklistService {
    /// Compares a stored summary against a full row scan.
    ///
    /// Housekeeping path, never used on updates. With `repair` the stored
    /// summary is overwritten by the scanned counters.
    pub async fn reconcile_summary(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        repair: bool,
    ) -> AppResult<Option<SummaryReconciliation>> {
        let Some(reconciliation) = self
            .repository
            .reconcile_summary(tenant_id, system_id, repair)
            .await?
        else {
            return Ok(None);
        };

        if reconciliation.has_drift() {
            warn!(
                tenant_id = %tenant_id,
                system_id = system_id,
                stored_total = reconciliation.stored.total_checks,
                stored_completed = reconciliation.stored.completed_checks,
                observed_total = reconciliation.observed.total_checks,
                observed_completed = reconciliation.observed.completed_checks,
                repaired = reconciliation.repaired,
                "validation summary drifted from check rows"
            );
        }

        if reconciliation.repaired {
            self.audit_repository
                .append_event(AuditEvent {
                    tenant_id,
                    subject: RECONCILER_SUBJECT.to_owned(),
                    action: AuditAction::ChecklistSummaryRepaired,
                    resource_type: "validation_summary".to_owned(),
                    resource_id: system_id.to_owned(),
                    detail: Some(format!(
                        "repaired counters from {}/{} to {}/{}",
                        reconciliation.stored.completed_checks,
                        reconciliation.stored.total_checks,
                        reconciliation.observed.completed_checks,
                        reconciliation.observed.total_checks
                    )),
                })
                .await?;
        }

        Ok(Some(reconciliation))
    }

    /// Lists every system that has a summary.
    pub async fn list_systems(&self) -> AppResult<Vec<ChecklistSystemKey>> {
        self.repository.list_systems().await
    }

    /// Reconciles every system, continuing past individual failures.
    pub async fn reconcile_all(&self, repair: bool) -> AppResult<ReconcileSweepReport> {
        let mut report = ReconcileSweepReport::default();

        for key in self.list_systems().await? {
            report.scanned += 1;
            match self
                .reconcile_summary(key.tenant_id, &key.system_id, repair)
                .await
            {
                Ok(Some(reconciliation)) if reconciliation.has_drift() => {
                    report.drifted += 1;
                    if reconciliation.repaired {
                        report.repaired += 1;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        tenant_id = %key.tenant_id,
                        system_id = key.system_id.as_str(),
                        error = %error,
                        "summary reconciliation failed"
                    );
                }
            }
        }

        Ok(report)
    }
}

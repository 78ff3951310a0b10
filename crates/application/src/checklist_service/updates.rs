use super::*;

use accessledger_domain::{CheckStatus, CheckUpdate};
use chrono::Utc;
use tracing::warn;

use crate::AppliedCheckUpdates;

impl ChecklistService {
    /// Flips the completion flag of one check.
    ///
    /// A `not_applicable` row is left alone and reported with
    /// `changed: false, locked: true`.
    pub async fn toggle_check(
        &self,
        actor: &UserIdentity,
        system_id: &str,
        check_id: &str,
        is_checked: bool,
    ) -> AppResult<CheckChangeResult> {
        self.change_one(actor, system_id, CheckUpdate::toggle(check_id, is_checked))
            .await
    }

    /// Sets the status of one check explicitly.
    ///
    /// This is the only path into or out of `not_applicable`; leaving it is
    /// recorded as an override.
    pub async fn set_check_status(
        &self,
        actor: &UserIdentity,
        system_id: &str,
        check_id: &str,
        status: CheckStatus,
    ) -> AppResult<CheckChangeResult> {
        self.change_one(actor, system_id, CheckUpdate::set_status(check_id, status))
            .await
    }

    /// Applies many transitions with one aggregated summary delta.
    ///
    /// Each row's delta is derived from its persisted state at write time, so
    /// replaying a payload after a partial failure never double counts. Rows
    /// that fail do not contribute to the delta; the report lists them.
    pub async fn bulk_status_change(
        &self,
        actor: &UserIdentity,
        system_id: &str,
        updates: Vec<CheckUpdate>,
    ) -> AppResult<BulkStatusChangeReport> {
        self.require(actor, &self.catalog.guards().checklist_write)
            .await?;

        let requested = updates.len();
        let applied = self.apply(actor, system_id, updates).await?;
        let report =
            BulkStatusChangeReport::from_results(applied.results, applied.applied_delta, applied.summary);

        if report.failed > 0 {
            warn!(
                tenant_id = %actor.tenant_id(),
                system_id = system_id,
                failed = report.failed,
                failed_checks = report.failed_check_ids().join(",").as_str(),
                "bulk status change partially failed"
            );
        }
        info!(
            tenant_id = %actor.tenant_id(),
            system_id = system_id,
            requested = requested,
            succeeded = report.succeeded,
            locked = report.locked,
            unchanged = report.unchanged,
            completed_delta = report.applied_delta.completed,
            total_delta = report.applied_delta.total,
            "bulk status change applied"
        );

        if report.succeeded > 0 {
            self.audit_repository
                .append_event(AuditEvent {
                    tenant_id: actor.tenant_id(),
                    subject: actor.subject().to_owned(),
                    action: AuditAction::ChecklistBulkUpdated,
                    resource_type: "validation_system".to_owned(),
                    resource_id: system_id.to_owned(),
                    detail: Some(format!(
                        "updated {} of {requested} checks (locked={}, unchanged={}, failed={}), completed {}/{}",
                        report.succeeded,
                        report.locked,
                        report.unchanged,
                        report.failed,
                        report.summary.completed_checks,
                        report.summary.total_checks
                    )),
                })
                .await?;
        }
        self.audit_overrides(actor, system_id, &report.results)
            .await?;

        Ok(report)
    }

    async fn change_one(
        &self,
        actor: &UserIdentity,
        system_id: &str,
        update: CheckUpdate,
    ) -> AppResult<CheckChangeResult> {
        self.require(actor, &self.catalog.guards().checklist_write)
            .await?;

        let check_id = update.check_id.clone();
        let status = update.status;
        let AppliedCheckUpdates {
            results, summary, ..
        } = self.apply(actor, system_id, vec![update]).await?;
        let Some(result) = results.into_iter().next() else {
            return Err(AppError::Internal(format!(
                "check update for '{check_id}' returned no outcome"
            )));
        };

        let (changed, locked) = match &result.outcome {
            CheckWriteOutcome::Applied { .. } => (true, false),
            CheckWriteOutcome::Unchanged => (false, false),
            CheckWriteOutcome::Locked => (false, true),
            CheckWriteOutcome::Missing => {
                return Err(AppError::NotFound(format!(
                    "check '{check_id}' was not found for system '{system_id}'"
                )));
            }
            CheckWriteOutcome::Failed { message } => {
                return Err(AppError::Internal(format!(
                    "failed to update check '{check_id}': {message}"
                )));
            }
        };

        if changed {
            self.audit_repository
                .append_event(AuditEvent {
                    tenant_id: actor.tenant_id(),
                    subject: actor.subject().to_owned(),
                    action: AuditAction::ChecklistCheckUpdated,
                    resource_type: "validation_check".to_owned(),
                    resource_id: format!("{system_id}:{check_id}"),
                    detail: Some(format!(
                        "set check '{check_id}' to '{}', completed {}/{}",
                        status.as_str(),
                        summary.completed_checks,
                        summary.total_checks
                    )),
                })
                .await?;
            self.audit_overrides(actor, system_id, std::slice::from_ref(&result))
                .await?;
        }

        let check = result.check.ok_or_else(|| {
            AppError::Internal(format!("check '{check_id}' has no state after update"))
        })?;

        Ok(CheckChangeResult {
            changed,
            locked,
            check,
            summary,
        })
    }

    async fn apply(
        &self,
        actor: &UserIdentity,
        system_id: &str,
        updates: Vec<CheckUpdate>,
    ) -> AppResult<AppliedCheckUpdates> {
        self.repository
            .apply_check_updates(
                actor.tenant_id(),
                system_id,
                updates,
                actor.subject(),
                Utc::now(),
            )
            .await
    }

    async fn audit_overrides(
        &self,
        actor: &UserIdentity,
        system_id: &str,
        results: &[CheckWriteResult],
    ) -> AppResult<()> {
        for result in results {
            let CheckWriteOutcome::Applied {
                overrode_not_applicable: true,
                ..
            } = result.outcome
            else {
                continue;
            };

            let status = result
                .check
                .as_ref()
                .map_or("unknown", |check| check.status.as_str());
            info!(
                tenant_id = %actor.tenant_id(),
                system_id = system_id,
                check_id = result.check_id.as_str(),
                status = status,
                actor = actor.subject(),
                "not_applicable check overridden"
            );

            self.audit_repository
                .append_event(AuditEvent {
                    tenant_id: actor.tenant_id(),
                    subject: actor.subject().to_owned(),
                    action: AuditAction::ChecklistNotApplicableOverridden,
                    resource_type: "validation_check".to_owned(),
                    resource_id: format!("{system_id}:{}", result.check_id),
                    detail: Some(format!(
                        "moved check '{}' from 'not_applicable' to '{status}'",
                        result.check_id
                    )),
                })
                .await?;
        }

        Ok(())
    }
}

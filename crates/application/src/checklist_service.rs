mod reconcile;
mod updates;


use std::sync::Arc;

use accessledger_core::{AppError, AppResult, NonEmptyString, UserIdentity};
use accessledger_domain::{
    AuditAction, PermissionCatalog, PermissionCode, SummaryDelta, ValidationCheck,
    ValidationSummary,
};
use tracing::info;

pub use reconcile::ReconcileSweepReport;

use crate::{
    AuditEvent, AuditRepository, AuthorizationService, ChecklistRepository, CheckWriteOutcome,
    CheckWriteResult, ResetSystemOutcome,
};

/// Result of initializing a system's checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializeSystemReport {
    /// Rows created by this call.
    pub created: u32,
    /// Rows that already existed.
    pub existing: u32,
    /// Whether the existing rows already covered the catalog and nothing was attempted.
    pub skipped: bool,
}

/// Result of a single check change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckChangeResult {
    /// Whether the row was rewritten.
    pub changed: bool,
    /// Whether the row is `not_applicable` and the change was refused softly.
    pub locked: bool,
    /// Row state after the call.
    pub check: ValidationCheck,
    /// Summary after the call.
    pub summary: ValidationSummary,
}

/// Per-row report of a bulk status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkStatusChangeReport {
    /// Row outcomes in request order.
    pub results: Vec<CheckWriteResult>,
    /// Rows written.
    pub succeeded: u32,
    /// Rows missing or not written.
    pub failed: u32,
    /// Rows refused because they are `not_applicable`.
    pub locked: u32,
    /// Rows already in the requested state.
    pub unchanged: u32,
    /// Delta applied to the summary, summed over written rows only.
    pub applied_delta: SummaryDelta,
    /// Summary after the batch.
    pub summary: ValidationSummary,
}

impl BulkStatusChangeReport {
    fn from_results(
        results: Vec<CheckWriteResult>,
        applied_delta: SummaryDelta,
        summary: ValidationSummary,
    ) -> Self {
        let mut report = Self {
            results: Vec::new(),
            succeeded: 0,
            failed: 0,
            locked: 0,
            unchanged: 0,
            applied_delta,
            summary,
        };

        for result in &results {
            match result.outcome {
                CheckWriteOutcome::Applied { .. } => report.succeeded += 1,
                CheckWriteOutcome::Unchanged => report.unchanged += 1,
                CheckWriteOutcome::Locked => report.locked += 1,
                CheckWriteOutcome::Missing | CheckWriteOutcome::Failed { .. } => {
                    report.failed += 1;
                }
            }
        }

        report.results = results;
        report
    }

    /// Returns the check ids of rows that were missing or failed to persist.
    #[must_use]
    pub fn failed_check_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|result| {
                matches!(
                    result.outcome,
                    CheckWriteOutcome::Missing | CheckWriteOutcome::Failed { .. }
                )
            })
            .map(|result| result.check_id.as_str())
            .collect()
    }

    /// Returns whether every requested row either persisted or needed no write.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Turns a partial failure into `AppError::Conflict` naming the failed rows.
    ///
    /// The rows that did persist stay committed; callers retry only the
    /// failed subset.
    pub fn into_result(self) -> AppResult<Self> {
        if self.is_complete() {
            return Ok(self);
        }

        Err(AppError::Conflict(format!(
            "{} of {} check updates failed for system '{}' (succeeded={}, failed=[{}], applied completed delta={}, total delta={})",
            self.failed,
            self.results.len(),
            self.summary.system_id,
            self.succeeded,
            self.failed_check_ids().join(", "),
            self.applied_delta.completed,
            self.applied_delta.total
        )))
    }
}

/// Application service for validation checklists and their summaries.
#[derive(Clone)]
pub struct ChecklistService {
    catalog: Arc<PermissionCatalog>,
    authorization_service: AuthorizationService,
    repository: Arc<dyn ChecklistRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl ChecklistService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        catalog: Arc<PermissionCatalog>,
        authorization_service: AuthorizationService,
        repository: Arc<dyn ChecklistRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            catalog,
            authorization_service,
            repository,
            audit_repository,
        }
    }

    /// Creates the missing catalog rows of a system.
    ///
    /// Rows listed in `not_applicable` start as `not_applicable`, the others as
    /// `pending`. Existing rows are never overwritten. When the stored rows
    /// already cover the catalog nothing is written and `skipped` is set.
    pub async fn initialize_system(
        &self,
        actor: &UserIdentity,
        system_id: &str,
        not_applicable: &[String],
    ) -> AppResult<InitializeSystemReport> {
        self.require(actor, &self.catalog.guards().checklist_write)
            .await?;

        let system_id = NonEmptyString::new(system_id)?;
        if let Some(unknown) = not_applicable
            .iter()
            .find(|check_id| self.catalog.find_check(check_id).is_none())
        {
            return Err(AppError::Validation(format!(
                "not_applicable check '{unknown}' is not in the validation catalog"
            )));
        }

        let expected = u32::try_from(self.catalog.list_checks().len()).map_err(|_| {
            AppError::Internal("validation catalog exceeds supported size".to_owned())
        })?;
        let existing = self
            .repository
            .count_checks(actor.tenant_id(), system_id.as_str())
            .await?;
        if existing >= expected {
            return Ok(InitializeSystemReport {
                created: 0,
                existing,
                skipped: true,
            });
        }

        let rows = self
            .catalog
            .list_checks()
            .iter()
            .map(|definition| {
                let excluded = not_applicable
                    .iter()
                    .any(|check_id| check_id == &definition.check_id);
                ValidationCheck::initial(system_id.as_str(), definition, excluded)
            })
            .collect();

        let outcome = self
            .repository
            .insert_missing_checks(actor.tenant_id(), system_id.as_str(), rows)
            .await?;

        info!(
            tenant_id = %actor.tenant_id(),
            system_id = system_id.as_str(),
            created = outcome.created,
            existing = outcome.existing,
            "checklist initialized"
        );

        if outcome.created > 0 {
            self.audit_repository
                .append_event(AuditEvent {
                    tenant_id: actor.tenant_id(),
                    subject: actor.subject().to_owned(),
                    action: AuditAction::ChecklistInitialized,
                    resource_type: "validation_system".to_owned(),
                    resource_id: system_id.as_str().to_owned(),
                    detail: Some(format!(
                        "created {} checks ({} not applicable), {} already present",
                        outcome.created,
                        not_applicable.len(),
                        outcome.existing
                    )),
                })
                .await?;
        }

        Ok(InitializeSystemReport {
            created: outcome.created,
            existing: outcome.existing,
            skipped: false,
        })
    }

    /// Deletes every row and the summary of a system. Irreversible.
    pub async fn reset_system(
        &self,
        actor: &UserIdentity,
        system_id: &str,
    ) -> AppResult<ResetSystemOutcome> {
        self.require(actor, &self.catalog.guards().checklist_reset)
            .await?;

        let outcome = self
            .repository
            .delete_system(actor.tenant_id(), system_id)
            .await?;
        if outcome.deleted_checks == 0 && !outcome.summary_deleted {
            return Err(AppError::NotFound(format!(
                "validation system '{system_id}' was not found"
            )));
        }

        info!(
            tenant_id = %actor.tenant_id(),
            system_id = system_id,
            deleted_checks = outcome.deleted_checks,
            "checklist reset"
        );

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id: actor.tenant_id(),
                subject: actor.subject().to_owned(),
                action: AuditAction::ChecklistReset,
                resource_type: "validation_system".to_owned(),
                resource_id: system_id.to_owned(),
                detail: Some(format!("deleted {} checks", outcome.deleted_checks)),
            })
            .await?;

        Ok(outcome)
    }

    /// Returns the summary of a system.
    pub async fn get_summary(
        &self,
        actor: &UserIdentity,
        system_id: &str,
    ) -> AppResult<ValidationSummary> {
        self.require(actor, &self.catalog.guards().checklist_read)
            .await?;

        self.repository
            .find_summary(actor.tenant_id(), system_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("validation system '{system_id}' was not found"))
            })
    }

    /// Lists the rows of a system ordered by category and check id.
    pub async fn list_checks(
        &self,
        actor: &UserIdentity,
        system_id: &str,
    ) -> AppResult<Vec<ValidationCheck>> {
        self.require(actor, &self.catalog.guards().checklist_read)
            .await?;

        self.repository
            .list_checks(actor.tenant_id(), system_id)
            .await
    }

    async fn require(&self, actor: &UserIdentity, permission: &PermissionCode) -> AppResult<()> {
        self.authorization_service
            .require_permission(actor, permission)
            .await
            .map(|_| ())
    }
}

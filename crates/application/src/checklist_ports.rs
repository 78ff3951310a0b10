use async_trait::async_trait;
use chrono::{DateTime, Utc};

use accessledger_core::{AppResult, TenantId};
use accessledger_domain::{CheckUpdate, SummaryDelta, ValidationCheck, ValidationSummary};

/// Result of inserting the missing rows of a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertChecksOutcome {
    /// Rows created by this call.
    pub created: u32,
    /// Rows that already existed and were left untouched.
    pub existing: u32,
}

/// What happened to one requested check update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckWriteOutcome {
    /// Row persisted; `delta` went into the summary.
    Applied {
        /// Summary adjustment contributed by this row.
        delta: SummaryDelta,
        /// Whether the row left `not_applicable`.
        overrode_not_applicable: bool,
    },
    /// Row already had the requested status.
    Unchanged,
    /// Row is `not_applicable` and no override was requested.
    Locked,
    /// No row exists for the check id.
    Missing,
    /// Row could not be written; it contributed nothing to the summary.
    Failed {
        /// Failure description.
        message: String,
    },
}

/// Per-row outcome of an update batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckWriteResult {
    /// Target check identifier.
    pub check_id: String,
    /// Outcome for the row.
    pub outcome: CheckWriteOutcome,
    /// Row state after the call, when the row exists.
    pub check: Option<ValidationCheck>,
}

/// Row outcomes plus the summary after the batch committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCheckUpdates {
    /// Per-row outcomes in request order.
    pub results: Vec<CheckWriteResult>,
    /// Sum of the deltas of applied rows.
    pub applied_delta: SummaryDelta,
    /// Summary after the delta was applied.
    pub summary: ValidationSummary,
}

/// Result of wiping a system's checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSystemOutcome {
    /// Deleted check rows.
    pub deleted_checks: u64,
    /// Whether a summary row existed and was deleted.
    pub summary_deleted: bool,
}

/// Stored versus scanned counters of one system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryReconciliation {
    /// Summary as stored before the scan.
    pub stored: ValidationSummary,
    /// Summary recomputed from check rows.
    pub observed: ValidationSummary,
    /// Whether the stored summary was overwritten with the observed one.
    pub repaired: bool,
}

impl SummaryReconciliation {
    /// Returns whether stored counters disagree with the rows.
    #[must_use]
    pub fn has_drift(&self) -> bool {
        !self.stored.counters_match(&self.observed)
    }
}

/// Tenant-qualified system identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChecklistSystemKey {
    /// Tenant owning the checklist.
    pub tenant_id: TenantId,
    /// Audited system.
    pub system_id: String,
}

/// Repository port for validation check rows and their summaries.
///
/// Every write method commits its row writes and the matching summary delta
/// as one unit.
#[async_trait]
pub trait ChecklistRepository: Send + Sync {
    /// Counts check rows of a system.
    async fn count_checks(&self, tenant_id: TenantId, system_id: &str) -> AppResult<u32>;

    /// Inserts rows whose check id is not present yet; existing rows are never
    /// overwritten. Creates the summary when absent, otherwise grows its total.
    async fn insert_missing_checks(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        checks: Vec<ValidationCheck>,
    ) -> AppResult<InsertChecksOutcome>;

    /// Applies updates against the rows' persisted state and the summed delta
    /// of the rows that were written.
    ///
    /// Fails with `AppError::NotFound` when the system has no summary.
    async fn apply_check_updates(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        updates: Vec<CheckUpdate>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> AppResult<AppliedCheckUpdates>;

    /// Deletes all rows and the summary of a system.
    async fn delete_system(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<ResetSystemOutcome>;

    /// Finds the summary of a system.
    async fn find_summary(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<Option<ValidationSummary>>;

    /// Lists check rows of a system ordered by category and check id.
    async fn list_checks(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<Vec<ValidationCheck>>;

    /// Scans rows, compares them with the stored summary and optionally
    /// overwrites the summary. Returns `None` when the system has no summary.
    async fn reconcile_summary(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        repair: bool,
    ) -> AppResult<Option<SummaryReconciliation>>;

    /// Lists every system that has a summary.
    async fn list_systems(&self) -> AppResult<Vec<ChecklistSystemKey>>;
}

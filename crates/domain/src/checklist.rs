//! Validation checklist rows, per-system summaries and the transition rules
//! that keep the two consistent through incremental deltas.

use std::ops::{Add, AddAssign};
use std::str::FromStr;

use accessledger_core::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CheckDefinition;

/// Status of one validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Not yet verified.
    Pending,
    /// Verified by an auditor.
    Checked,
    /// Excluded from the audit of this system.
    NotApplicable,
}

impl CheckStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Checked => "checked",
            Self::NotApplicable => "not_applicable",
        }
    }

    /// Returns whether the status counts toward a summary's total.
    #[must_use]
    pub fn is_applicable(self) -> bool {
        self != Self::NotApplicable
    }
}

impl FromStr for CheckStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "checked" => Ok(Self::Checked),
            "not_applicable" => Ok(Self::NotApplicable),
            _ => Err(AppError::Validation(format!(
                "unknown check status value '{value}'"
            ))),
        }
    }
}

/// Derived completion state of a system's checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    /// No check completed.
    NotStarted,
    /// Some checks completed.
    InProgress,
    /// Every applicable check completed.
    Complete,
}

impl SummaryStatus {
    /// Derives the status from counters.
    #[must_use]
    pub fn from_counts(completed_checks: u32, total_checks: u32) -> Self {
        if completed_checks == 0 {
            Self::NotStarted
        } else if completed_checks >= total_checks {
            Self::Complete
        } else {
            Self::InProgress
        }
    }

    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        }
    }
}

impl FromStr for SummaryStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "complete" => Ok(Self::Complete),
            _ => Err(AppError::Validation(format!(
                "unknown summary status value '{value}'"
            ))),
        }
    }
}

/// One audit check row for one system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCheck {
    /// Audited system.
    pub system_id: String,
    /// Catalog category.
    pub category_id: String,
    /// Catalog check identifier, unique per system.
    pub check_id: String,
    /// Completion flag, true exactly when `status` is `checked`.
    pub is_checked: bool,
    /// Current status.
    pub status: CheckStatus,
    /// Auditor that completed the check.
    pub checked_by: Option<String>,
    /// Completion timestamp.
    pub checked_at: Option<DateTime<Utc>>,
}

impl ValidationCheck {
    /// Creates the initial row for a catalog check.
    #[must_use]
    pub fn initial(system_id: &str, definition: &CheckDefinition, not_applicable: bool) -> Self {
        Self {
            system_id: system_id.to_owned(),
            category_id: definition.category_id.clone(),
            check_id: definition.check_id.clone(),
            is_checked: false,
            status: if not_applicable {
                CheckStatus::NotApplicable
            } else {
                CheckStatus::Pending
            },
            checked_by: None,
            checked_at: None,
        }
    }

    /// Plans how `update` changes this row, given its current persisted state.
    ///
    /// The returned delta is computed from the observed state, so re-applying
    /// an update that already landed yields [`CheckUpdatePlan::Unchanged`].
    #[must_use]
    pub fn plan_update(
        &self,
        update: &CheckUpdate,
        actor: &str,
        at: DateTime<Utc>,
    ) -> CheckUpdatePlan {
        if self.status == update.status {
            return CheckUpdatePlan::Unchanged;
        }

        let leaves_not_applicable = self.status == CheckStatus::NotApplicable;
        if leaves_not_applicable && !update.override_not_applicable {
            return CheckUpdatePlan::Locked;
        }

        let is_checked = update.status == CheckStatus::Checked;
        let next = Self {
            system_id: self.system_id.clone(),
            category_id: self.category_id.clone(),
            check_id: self.check_id.clone(),
            is_checked,
            status: update.status,
            checked_by: is_checked.then(|| actor.to_owned()),
            checked_at: is_checked.then_some(at),
        };

        let delta = SummaryDelta {
            completed: i64::from(next.is_checked) - i64::from(self.is_checked),
            total: i64::from(next.status.is_applicable()) - i64::from(self.status.is_applicable()),
        };

        CheckUpdatePlan::Apply {
            next,
            delta,
            overrode_not_applicable: leaves_not_applicable,
        }
    }
}

/// Requested transition for one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckUpdate {
    /// Target check identifier.
    pub check_id: String,
    /// Requested status.
    pub status: CheckStatus,
    /// Allows moving a `not_applicable` check back to pending or checked.
    #[serde(default)]
    pub override_not_applicable: bool,
}

impl CheckUpdate {
    /// Boolean toggle. Never leaves or enters `not_applicable`.
    #[must_use]
    pub fn toggle(check_id: impl Into<String>, is_checked: bool) -> Self {
        Self {
            check_id: check_id.into(),
            status: if is_checked {
                CheckStatus::Checked
            } else {
                CheckStatus::Pending
            },
            override_not_applicable: false,
        }
    }

    /// Explicit status assignment, the only way in or out of `not_applicable`.
    #[must_use]
    pub fn set_status(check_id: impl Into<String>, status: CheckStatus) -> Self {
        Self {
            check_id: check_id.into(),
            status,
            override_not_applicable: true,
        }
    }
}

/// Outcome of planning one check update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckUpdatePlan {
    /// Row already has the requested status.
    Unchanged,
    /// Row is `not_applicable` and the update did not request an override.
    Locked,
    /// Row must be rewritten and the summary adjusted by `delta`.
    Apply {
        /// Row state to persist.
        next: ValidationCheck,
        /// Summary adjustment.
        delta: SummaryDelta,
        /// Whether the row left `not_applicable`.
        overrode_not_applicable: bool,
    },
}

/// Signed adjustment to a summary's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDelta {
    /// Change of `completed_checks`.
    pub completed: i64,
    /// Change of `total_checks`.
    pub total: i64,
}

impl SummaryDelta {
    /// Returns whether the delta leaves counters untouched.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.completed == 0 && self.total == 0
    }
}

impl Add for SummaryDelta {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            completed: self.completed + other.completed,
            total: self.total + other.total,
        }
    }
}

impl AddAssign for SummaryDelta {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Denormalized completion counters for one system.
///
/// `total_checks` counts rows that are not `not_applicable`;
/// `completed_checks` counts rows with `is_checked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Audited system.
    pub system_id: String,
    /// Applicable checks.
    pub total_checks: u32,
    /// Completed checks.
    pub completed_checks: u32,
    /// Derived status.
    pub status: SummaryStatus,
    /// Last time the counters moved.
    pub last_validated_at: Option<DateTime<Utc>>,
    /// Auditor behind the last counter move.
    pub last_validated_by: Option<String>,
}

impl ValidationSummary {
    /// Creates a summary, clamping `completed_checks` into `[0, total_checks]`.
    #[must_use]
    pub fn new(system_id: impl Into<String>, total_checks: u32, completed_checks: u32) -> Self {
        let completed_checks = completed_checks.min(total_checks);
        Self {
            system_id: system_id.into(),
            total_checks,
            completed_checks,
            status: SummaryStatus::from_counts(completed_checks, total_checks),
            last_validated_at: None,
            last_validated_by: None,
        }
    }

    /// Recomputes counters from a full scan of check rows.
    ///
    /// Only used at creation time and for reconciliation, never on the
    /// update path.
    #[must_use]
    pub fn observed<'a>(
        system_id: impl Into<String>,
        checks: impl IntoIterator<Item = &'a ValidationCheck>,
    ) -> Self {
        let (total, completed) = checks
            .into_iter()
            .fold((0_u32, 0_u32), |(total, completed), check| {
                (
                    total.saturating_add(u32::from(check.status.is_applicable())),
                    completed.saturating_add(u32::from(check.is_checked)),
                )
            });

        Self::new(system_id, total, completed)
    }

    /// Applies a delta with clamping and recomputes the derived status.
    pub fn apply_delta(&mut self, delta: SummaryDelta, actor: &str, at: DateTime<Utc>) {
        if delta.is_zero() {
            return;
        }

        self.total_checks = clamp_counter(i64::from(self.total_checks) + delta.total, u32::MAX);
        self.completed_checks = clamp_counter(
            i64::from(self.completed_checks) + delta.completed,
            self.total_checks,
        );
        self.status = SummaryStatus::from_counts(self.completed_checks, self.total_checks);
        self.last_validated_at = Some(at);
        self.last_validated_by = Some(actor.to_owned());
    }

    /// Returns whether both counters agree with another summary.
    #[must_use]
    pub fn counters_match(&self, other: &Self) -> bool {
        self.total_checks == other.total_checks && self.completed_checks == other.completed_checks
    }
}

fn clamp_counter(value: i64, upper: u32) -> u32 {
    u32::try_from(value.clamp(0, i64::from(upper))).unwrap_or(upper)
}

//! Storage trait for company subscriptions and their history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{CompanySubscription, SubscriptionRecord, SubscriptionStatus};
use crate::error::Result;
use crate::plans::PlanFeatures;

/// A plan change to apply atomically.
///
/// Applying it cancels the company's current active record (if any), inserts
/// `record` and overwrites the company projection with `projection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanChange {
    pub record: SubscriptionRecord,
    pub projection: CompanySubscription,
    /// Reason stored on the superseded record.
    pub superseded_reason: String,
}

/// Cancellation of the active record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancellation {
    pub company_id: String,
    pub actor_id: String,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// A date-derived status write, conditional on the projection it was derived
/// from.
///
/// The write applies only while the stored status, plan, billing cycle and
/// end dates still equal those in `expected`. A plan change committed after
/// the read makes it a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub expected: CompanySubscription,
    pub status: SubscriptionStatus,
    pub features: PlanFeatures,
    pub at: DateTime<Utc>,
}

impl Reconciliation {
    /// Whether `current` is still the projection this write was derived from.
    #[must_use]
    pub fn still_matches(&self, current: &CompanySubscription) -> bool {
        let expected = &self.expected;
        current.status == expected.status
            && current.plan_id == expected.plan_id
            && current.billing_cycle == expected.billing_cycle
            && current.subscription_end_date == expected.subscription_end_date
            && current.trial_end_date == expected.trial_end_date
    }
}

/// Trait for storing company subscriptions.
///
/// Implement this trait over your database. Each method that writes more than
/// one row must do so in a single transaction: readers must never observe a
/// company with two active records or a projection that disagrees with the
/// record just written.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Get the subscription projection stored on a company.
    async fn get_company(&self, company_id: &str) -> Result<Option<CompanySubscription>>;

    /// Create or overwrite a company projection without touching history.
    async fn save_company(&self, company: &CompanySubscription) -> Result<()>;

    /// Persist a status transition and refreshed feature flags, but only if
    /// the projection still matches [`Reconciliation::expected`].
    ///
    /// Returns `false` without writing when the projection changed since it
    /// was read. Idempotent: writing the same values twice leaves the same
    /// state.
    async fn reconcile_projection(&self, reconciliation: &Reconciliation) -> Result<bool>;

    /// Apply a plan change in one transaction.
    ///
    /// Returns the superseded record, if there was one.
    async fn apply_plan_change(&self, change: &PlanChange) -> Result<Option<SubscriptionRecord>>;

    /// Cancel the active record and mark the projection cancelled in one
    /// transaction.
    ///
    /// Returns `None` without writing anything when no record is active.
    async fn cancel_active(&self, cancellation: &Cancellation)
        -> Result<Option<SubscriptionRecord>>;

    /// The company's active history record.
    async fn get_active_record(&self, company_id: &str) -> Result<Option<SubscriptionRecord>>;

    /// All history records for a company, oldest first.
    async fn list_history(&self, company_id: &str) -> Result<Vec<SubscriptionRecord>>;
}

//! Subscription status, company projection and history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PolicyError;
use crate::plans::{BillingCycle, Plan, PlanFeatures, PlanId, PlanLimits};

/// Effective status of a company's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Expired and cancelled subscriptions cannot use limit-gated actions.
    #[must_use]
    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" | "trialing" => Ok(Self::Trial),
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(PolicyError::invalid_input(format!(
                "unknown subscription status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The subscription fields stored on the company itself.
///
/// This is a denormalized projection of the latest plan change; the stored
/// `status` may lag behind the dates until the resolver reconciles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySubscription {
    pub company_id: String,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    pub billing_cycle: BillingCycle,
    pub subscription_start_date: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub features: PlanFeatures,
}

impl CompanySubscription {
    /// A company on the free plan with no end date.
    #[must_use]
    pub fn free(company_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            plan_id: PlanId::Free,
            status: SubscriptionStatus::Active,
            billing_cycle: BillingCycle::Monthly,
            subscription_start_date: None,
            subscription_end_date: None,
            trial_end_date: None,
            features: PlanFeatures::none(),
        }
    }

    /// A company trialing `plan` until `trial_end`.
    #[must_use]
    pub fn trial(company_id: impl Into<String>, plan: &Plan, trial_end: DateTime<Utc>) -> Self {
        Self {
            company_id: company_id.into(),
            plan_id: plan.id,
            status: SubscriptionStatus::Trial,
            billing_cycle: plan.billing_cycle,
            subscription_start_date: None,
            subscription_end_date: None,
            trial_end_date: Some(trial_end),
            features: plan.features,
        }
    }

    /// A company with a paid subscription to `plan` running `start..end`.
    #[must_use]
    pub fn active(
        company_id: impl Into<String>,
        plan: &Plan,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            company_id: company_id.into(),
            plan_id: plan.id,
            status: SubscriptionStatus::Active,
            billing_cycle: plan.billing_cycle,
            subscription_start_date: Some(start),
            subscription_end_date: end,
            trial_end_date: None,
            features: plan.features,
        }
    }

    /// The date that ends the current period for the stored status.
    #[must_use]
    pub fn current_end_date(&self) -> Option<DateTime<Utc>> {
        match self.status {
            SubscriptionStatus::Trial => self.trial_end_date,
            _ => self.subscription_end_date,
        }
    }
}

/// Status of a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Cancelled,
}

impl RecordStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(PolicyError::invalid_input(format!(
                "unknown record status '{}'",
                other
            ))),
        }
    }
}

/// One row of a company's append-only subscription history.
///
/// Name, price, currency and limits are snapshots taken when the record was
/// created, so later catalog edits do not rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub company_id: String,
    pub plan_id: PlanId,
    pub plan_name: String,
    pub status: RecordStatus,
    pub billing_cycle: BillingCycle,
    pub price_cents: i64,
    pub currency: String,
    pub start_date: DateTime<Utc>,
    /// `None` for open-ended (free) subscriptions.
    pub end_date: Option<DateTime<Utc>>,
    pub limits: PlanLimits,
    pub notes: Option<String>,
    pub created_by: String,
    pub modified_by: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// A new active record snapshotting `plan`.
    #[must_use]
    pub fn new(
        company_id: impl Into<String>,
        plan: &Plan,
        start_date: DateTime<Utc>,
        end_date: Option<DateTime<Utc>>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id: company_id.into(),
            plan_id: plan.id,
            plan_name: plan.name.clone(),
            status: RecordStatus::Active,
            billing_cycle: plan.billing_cycle,
            price_cents: plan.price_cents,
            currency: plan.currency.clone(),
            start_date,
            end_date,
            limits: plan.limits,
            notes: None,
            created_by: created_by.into(),
            modified_by: None,
            cancelled_by: None,
            cancellation_reason: None,
            created_at: start_date,
            updated_at: start_date,
        }
    }

    #[must_use]
    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    /// Mark this record cancelled.
    pub fn cancel(&mut self, actor: &str, reason: Option<&str>, at: DateTime<Utc>) {
        self.status = RecordStatus::Cancelled;
        self.cancelled_by = Some(actor.to_string());
        self.modified_by = Some(actor.to_string());
        self.cancellation_reason = reason.map(str::to_string);
        self.updated_at = at;
    }
}

//! Subscription status resolution.
//!
//! Status is derived from stored dates at read time. When the derived status
//! (or the plan's feature flags) differ from what is stored on the company,
//! the resolver writes the reconciliation back before returning. That write is
//! best-effort: on failure the computed status is still returned.
//!
//! The write is conditional on the projection it was derived from. If an admin
//! plan change lands between the read and the write, the write is skipped and
//! the company is resolved again from the fresh projection.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::audit::{AuditLogger, SubscriptionAuditEvent};
use super::storage::{Reconciliation, SubscriptionStore};
use super::types::{CompanySubscription, SubscriptionStatus};
use crate::clock::SharedClock;
use crate::config::PolicyConfig;
use crate::error::{PolicyError, Result};
use crate::plans::{BillingCycle, Limit, Plan, PlanCatalog, UsageDimension};
use crate::usage::{UsageAccessor, UsageSource};
use crate::validation::validate_company_id;

/// What a warning is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    SubscriptionExpiry,
    PackageLimit,
    BookingLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// A transient notice attached to a status report. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub severity: Severity,
    pub message: String,
}

/// A company's subscription with its status derived for "now".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubscription {
    /// The projection, with `status` and `features` reconciled.
    pub company: CompanySubscription,
    /// The catalog plan for the company's plan id and billing cycle.
    pub plan: Plan,
}

impl ResolvedSubscription {
    #[must_use]
    pub fn status(&self) -> SubscriptionStatus {
        self.company.status
    }
}

/// Result of [`StatusResolver::get_subscription_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusReport {
    pub company_id: String,
    pub status: SubscriptionStatus,
    pub plan: Plan,
    pub billing_cycle: BillingCycle,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub warnings: Vec<Warning>,
}

/// Reads made before giving up on a projection that keeps changing.
const RECONCILE_ATTEMPTS: usize = 3;

enum Persisted {
    Settled,
    Stale,
}

/// Derive the effective status from the stored projection.
///
/// Trials past their end become expired, as do active subscriptions past
/// their end date. Expired and cancelled never move back.
#[must_use]
pub fn derive_status(company: &CompanySubscription, now: DateTime<Utc>) -> SubscriptionStatus {
    match company.status {
        SubscriptionStatus::Trial if company.trial_end_date.is_some_and(|end| now > end) => {
            SubscriptionStatus::Expired
        }
        SubscriptionStatus::Active
            if company.subscription_end_date.is_some_and(|end| now > end) =>
        {
            SubscriptionStatus::Expired
        }
        other => other,
    }
}

/// Resolves effective subscription status and produces warnings.
pub struct StatusResolver<S: SubscriptionStore, U: UsageSource> {
    store: Arc<S>,
    usage: UsageAccessor<U>,
    catalog: Arc<PlanCatalog>,
    config: Arc<PolicyConfig>,
    clock: SharedClock,
    audit: Arc<dyn AuditLogger>,
}

impl<S: SubscriptionStore, U: UsageSource> Clone for StatusResolver<S, U> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            usage: self.usage.clone(),
            catalog: Arc::clone(&self.catalog),
            config: Arc::clone(&self.config),
            clock: Arc::clone(&self.clock),
            audit: Arc::clone(&self.audit),
        }
    }
}

impl<S: SubscriptionStore, U: UsageSource> StatusResolver<S, U> {
    pub fn new(
        store: Arc<S>,
        usage: UsageAccessor<U>,
        catalog: Arc<PlanCatalog>,
        config: Arc<PolicyConfig>,
        clock: SharedClock,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            store,
            usage,
            catalog,
            config,
            clock,
            audit,
        }
    }

    /// Load the company, derive its status and reconcile the projection.
    ///
    /// Does not compute warnings, so it issues no usage queries.
    pub async fn resolve(&self, company_id: &str) -> Result<ResolvedSubscription> {
        validate_company_id(company_id)?;

        let mut attempt = 1;
        loop {
            let mut company = self
                .store
                .get_company(company_id)
                .await?
                .ok_or_else(|| PolicyError::company_not_found(company_id))?;

            let plan = self
                .catalog
                .plan(company.plan_id, company.billing_cycle)
                .ok_or_else(|| PolicyError::plan_not_found(company.plan_id.as_str()))?;

            let now = self.clock.now();
            let status = derive_status(&company, now);
            if status != company.status || company.features != plan.features {
                let persisted = self.reconcile(&company, status, &plan, now).await;
                if matches!(persisted, Persisted::Stale) && attempt < RECONCILE_ATTEMPTS {
                    attempt += 1;
                    continue;
                }
                company.status = status;
                company.features = plan.features;
            }

            return Ok(ResolvedSubscription { company, plan });
        }
    }

    /// Resolve status and attach expiry and usage warnings.
    pub async fn get_subscription_status(&self, company_id: &str) -> Result<SubscriptionStatusReport> {
        let resolved = self.resolve(company_id).await?;
        let now = self.clock.now();

        let mut warnings = Vec::new();
        if let Some(warning) = self.expiry_warning(&resolved.company, now) {
            warnings.push(warning);
        }

        let threshold = self.config.warning_threshold_percent;
        for (dimension, kind) in [
            (UsageDimension::Packages, WarningKind::PackageLimit),
            (UsageDimension::BookingsPerMonth, WarningKind::BookingLimit),
        ] {
            let limit = resolved.plan.limit(dimension);
            if limit.is_unlimited() {
                continue;
            }
            let current = self.usage.count(company_id, dimension).await?;
            if limit.reached_percent(current, threshold) {
                warnings.push(usage_warning(kind, dimension, current, limit));
            }
        }

        let company = resolved.company;
        Ok(SubscriptionStatusReport {
            company_id: company.company_id,
            status: company.status,
            plan: resolved.plan,
            billing_cycle: company.billing_cycle,
            subscription_end_date: company.subscription_end_date,
            trial_end_date: company.trial_end_date,
            warnings,
        })
    }

    fn expiry_warning(&self, company: &CompanySubscription, now: DateTime<Utc>) -> Option<Warning> {
        match company.status {
            SubscriptionStatus::Expired => Some(Warning {
                kind: WarningKind::SubscriptionExpiry,
                severity: Severity::Critical,
                message: "Your subscription has expired. Renew to restore access to your plan."
                    .to_string(),
            }),
            SubscriptionStatus::Trial | SubscriptionStatus::Active => {
                let end = company.current_end_date()?;
                let window = Duration::days(i64::from(self.config.expiry_warning_days));
                if end - now > window {
                    return None;
                }
                let what = if company.status == SubscriptionStatus::Trial {
                    "trial"
                } else {
                    "subscription"
                };
                Some(Warning {
                    kind: WarningKind::SubscriptionExpiry,
                    severity: Severity::Warning,
                    message: format!(
                        "Your {} ends in {}",
                        what,
                        format_days(days_until(now, end))
                    ),
                })
            }
            SubscriptionStatus::Cancelled => None,
        }
    }

    async fn reconcile(
        &self,
        company: &CompanySubscription,
        status: SubscriptionStatus,
        plan: &Plan,
        now: DateTime<Utc>,
    ) -> Persisted {
        let reconciliation = Reconciliation {
            expected: company.clone(),
            status,
            features: plan.features,
            at: now,
        };
        match self.store.reconcile_projection(&reconciliation).await {
            Ok(true) => {
                if status != company.status {
                    tracing::info!(
                        target: "waymark::subscription",
                        company_id = %company.company_id,
                        from = %company.status,
                        to = %status,
                        "Persisted subscription status transition"
                    );
                    self.audit
                        .log(SubscriptionAuditEvent::StatusReconciled {
                            company_id: company.company_id.clone(),
                            from_status: company.status.to_string(),
                            to_status: status.to_string(),
                        })
                        .await;
                } else {
                    tracing::debug!(
                        target: "waymark::subscription",
                        company_id = %company.company_id,
                        plan_id = %plan.id,
                        "Refreshed denormalized plan features"
                    );
                }
                Persisted::Settled
            }
            Ok(false) => {
                tracing::debug!(
                    target: "waymark::subscription",
                    company_id = %company.company_id,
                    "Projection changed since read; skipping reconciliation"
                );
                Persisted::Stale
            }
            Err(e) => {
                tracing::warn!(
                    target: "waymark::subscription",
                    company_id = %company.company_id,
                    from = %company.status,
                    to = %status,
                    error = %e,
                    "Failed to persist subscription reconciliation; returning computed status"
                );
                Persisted::Settled
            }
        }
    }
}

fn usage_warning(kind: WarningKind, dimension: UsageDimension, current: u64, limit: Limit) -> Warning {
    Warning {
        kind,
        severity: Severity::Warning,
        message: format!(
            "You have used {} of {} {}",
            current,
            limit,
            dimension.label()
        ),
    }
}

/// Whole days until `end`, rounded up.
fn days_until(now: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let secs = (end - now).num_seconds().max(0);
    (secs + 86_399) / 86_400
}

fn format_days(days: i64) -> String {
    match days {
        0 => "less than a day".to_string(),
        1 => "1 day".to_string(),
        n => format!("{} days", n),
    }
}

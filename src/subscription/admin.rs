//! Admin-driven plan changes.
//!
//! Each operation validates its inputs, builds the new history record and
//! company projection, and hands both to the store in a single call.

use chrono::{DateTime, Months, Utc};
use std::sync::Arc;

use super::audit::{AuditLogger, SubscriptionAuditEvent};
use super::storage::{Cancellation, PlanChange, SubscriptionStore};
use super::types::{CompanySubscription, SubscriptionRecord};
use crate::clock::SharedClock;
use crate::error::{PolicyError, Result};
use crate::plans::{BillingCycle, Plan, PlanCatalog, PlanId};
use crate::validation::{validate_actor_id, validate_company_id};

/// Direction constraint for a plan change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Any,
    Up,
    Down,
}

/// Plan change operations performed by marketplace administrators.
pub struct SubscriptionAdmin<S: SubscriptionStore> {
    store: Arc<S>,
    catalog: Arc<PlanCatalog>,
    clock: SharedClock,
    audit: Arc<dyn AuditLogger>,
}

impl<S: SubscriptionStore> Clone for SubscriptionAdmin<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
            clock: Arc::clone(&self.clock),
            audit: Arc::clone(&self.audit),
        }
    }
}

impl<S: SubscriptionStore> SubscriptionAdmin<S> {
    pub fn new(
        store: Arc<S>,
        catalog: Arc<PlanCatalog>,
        clock: SharedClock,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            audit,
        }
    }

    /// Put a company on a trial of `plan_id`.
    ///
    /// Creates the company projection if it does not exist. Fails when the
    /// plan has no trial, or the company already trialed or has an active
    /// subscription record.
    pub async fn start_trial(
        &self,
        company_id: &str,
        plan_id: PlanId,
        actor_id: &str,
    ) -> Result<CompanySubscription> {
        validate_company_id(company_id)?;
        validate_actor_id(actor_id)?;
        let plan = self.plan(plan_id, BillingCycle::Monthly)?;

        if plan.trial_days == 0 {
            return Err(PolicyError::invalid_plan_change(format!(
                "plan '{}' does not offer a trial",
                plan.id
            )));
        }

        if let Some(existing) = self.store.get_company(company_id).await? {
            if existing.trial_end_date.is_some() {
                return Err(PolicyError::invalid_plan_change(format!(
                    "company '{}' has already used its trial",
                    company_id
                )));
            }
        }
        if self.store.get_active_record(company_id).await?.is_some() {
            return Err(PolicyError::invalid_plan_change(format!(
                "company '{}' already has an active subscription",
                company_id
            )));
        }

        let trial_end = self.clock.now() + chrono::Duration::days(i64::from(plan.trial_days));
        let company = CompanySubscription::trial(company_id, &plan, trial_end);
        self.store.save_company(&company).await?;

        self.audit
            .log(SubscriptionAuditEvent::TrialStarted {
                company_id: company_id.to_string(),
                plan_id: plan.id,
                actor_id: actor_id.to_string(),
                trial_days: plan.trial_days,
            })
            .await;

        Ok(company)
    }

    /// Activate a paid (or free) subscription, replacing whatever is active.
    pub async fn activate(
        &self,
        company_id: &str,
        plan_id: PlanId,
        cycle: BillingCycle,
        actor_id: &str,
        notes: Option<String>,
    ) -> Result<SubscriptionRecord> {
        let (record, _) = self
            .change(company_id, plan_id, cycle, actor_id, notes, Direction::Any, true)
            .await?;
        self.audit
            .log(SubscriptionAuditEvent::PlanActivated {
                company_id: company_id.to_string(),
                plan_id,
                actor_id: actor_id.to_string(),
                record_id: record.id.to_string(),
            })
            .await;
        Ok(record)
    }

    /// Move to a higher-ranked plan.
    pub async fn upgrade(
        &self,
        company_id: &str,
        plan_id: PlanId,
        cycle: BillingCycle,
        actor_id: &str,
        notes: Option<String>,
    ) -> Result<SubscriptionRecord> {
        self.change_and_log(company_id, plan_id, cycle, actor_id, notes, Direction::Up)
            .await
    }

    /// Move to a lower-ranked plan.
    pub async fn downgrade(
        &self,
        company_id: &str,
        plan_id: PlanId,
        cycle: BillingCycle,
        actor_id: &str,
        notes: Option<String>,
    ) -> Result<SubscriptionRecord> {
        self.change_and_log(company_id, plan_id, cycle, actor_id, notes, Direction::Down)
            .await
    }

    /// Move to any other plan or billing cycle.
    pub async fn change_plan(
        &self,
        company_id: &str,
        plan_id: PlanId,
        cycle: BillingCycle,
        actor_id: &str,
        notes: Option<String>,
    ) -> Result<SubscriptionRecord> {
        self.change_and_log(company_id, plan_id, cycle, actor_id, notes, Direction::Any)
            .await
    }

    /// Extend the current plan by `months` calendar months.
    ///
    /// The new end date counts from the later of now and the current end date,
    /// so extending an expired subscription starts from today.
    pub async fn extend(
        &self,
        company_id: &str,
        months: u32,
        actor_id: &str,
    ) -> Result<SubscriptionRecord> {
        validate_company_id(company_id)?;
        validate_actor_id(actor_id)?;
        if months == 0 {
            return Err(PolicyError::invalid_input("months must be greater than 0"));
        }

        let company = self.company(company_id).await?;
        let plan = self.plan(company.plan_id, company.billing_cycle)?;
        if plan.is_free() {
            return Err(PolicyError::invalid_plan_change(
                "the free plan has no end date to extend",
            ));
        }

        let now = self.clock.now();
        let base = company.current_end_date().map_or(now, |end| end.max(now));
        let new_end = add_months(base, months)?;
        let start = company.subscription_start_date.unwrap_or(now);

        let record = SubscriptionRecord::new(company_id, &plan, now, Some(new_end), actor_id)
            .with_notes(Some(format!("Extended by {} month(s)", months)));
        let change = PlanChange {
            projection: CompanySubscription::active(company_id, &plan, start, Some(new_end)),
            record,
            superseded_reason: "extended".to_string(),
        };
        self.store.apply_plan_change(&change).await?;

        tracing::info!(
            target: "waymark::subscription",
            company_id = %company_id,
            plan_id = %plan.id,
            months,
            new_end = %new_end,
            "Subscription extended"
        );
        self.audit
            .log(SubscriptionAuditEvent::SubscriptionExtended {
                company_id: company_id.to_string(),
                plan_id: plan.id,
                actor_id: actor_id.to_string(),
                months,
                record_id: change.record.id.to_string(),
            })
            .await;

        Ok(change.record)
    }

    /// Cancel the active subscription record.
    pub async fn cancel(
        &self,
        company_id: &str,
        actor_id: &str,
        reason: Option<String>,
    ) -> Result<SubscriptionRecord> {
        validate_company_id(company_id)?;
        validate_actor_id(actor_id)?;
        self.company(company_id).await?;

        let cancellation = Cancellation {
            company_id: company_id.to_string(),
            actor_id: actor_id.to_string(),
            reason,
            at: self.clock.now(),
        };
        let record = self
            .store
            .cancel_active(&cancellation)
            .await?
            .ok_or_else(|| PolicyError::NoActiveSubscription {
                company_id: company_id.to_string(),
            })?;

        tracing::info!(
            target: "waymark::subscription",
            company_id = %company_id,
            record_id = %record.id,
            "Subscription cancelled"
        );
        self.audit
            .log(SubscriptionAuditEvent::SubscriptionCancelled {
                company_id: company_id.to_string(),
                actor_id: actor_id.to_string(),
                record_id: record.id.to_string(),
                reason: cancellation.reason,
            })
            .await;

        Ok(record)
    }

    /// Full subscription history, oldest first.
    pub async fn history(&self, company_id: &str) -> Result<Vec<SubscriptionRecord>> {
        validate_company_id(company_id)?;
        self.company(company_id).await?;
        self.store.list_history(company_id).await
    }

    async fn change_and_log(
        &self,
        company_id: &str,
        plan_id: PlanId,
        cycle: BillingCycle,
        actor_id: &str,
        notes: Option<String>,
        direction: Direction,
    ) -> Result<SubscriptionRecord> {
        let (record, from_plan) = self
            .change(company_id, plan_id, cycle, actor_id, notes, direction, false)
            .await?;
        self.audit
            .log(SubscriptionAuditEvent::PlanChanged {
                company_id: company_id.to_string(),
                from_plan,
                to_plan: plan_id,
                actor_id: actor_id.to_string(),
                record_id: record.id.to_string(),
            })
            .await;
        Ok(record)
    }

    #[allow(clippy::too_many_arguments)]
    async fn change(
        &self,
        company_id: &str,
        plan_id: PlanId,
        cycle: BillingCycle,
        actor_id: &str,
        notes: Option<String>,
        direction: Direction,
        allow_same: bool,
    ) -> Result<(SubscriptionRecord, PlanId)> {
        validate_company_id(company_id)?;
        validate_actor_id(actor_id)?;

        let company = self.company(company_id).await?;
        let current = self.plan(company.plan_id, company.billing_cycle)?;
        let target = self.plan(plan_id, cycle)?;

        match direction {
            Direction::Up if target.rank <= current.rank => {
                return Err(PolicyError::invalid_plan_change(format!(
                    "'{}' is not an upgrade from '{}'",
                    target.id, current.id
                )));
            }
            Direction::Down if target.rank >= current.rank => {
                return Err(PolicyError::invalid_plan_change(format!(
                    "'{}' is not a downgrade from '{}'",
                    target.id, current.id
                )));
            }
            Direction::Any
                if !allow_same
                    && target.id == current.id
                    && target.billing_cycle == current.billing_cycle =>
            {
                return Err(PolicyError::invalid_plan_change(format!(
                    "company '{}' is already on '{}' ({})",
                    company_id, target.id, target.billing_cycle
                )));
            }
            _ => {}
        }

        let now = self.clock.now();
        let end = period_end(&target, now)?;
        let change = PlanChange {
            record: SubscriptionRecord::new(company_id, &target, now, end, actor_id)
                .with_notes(notes),
            projection: CompanySubscription::active(company_id, &target, now, end),
            superseded_reason: format!("superseded by {}", target.id),
        };
        let superseded = self.store.apply_plan_change(&change).await?;

        tracing::info!(
            target: "waymark::subscription",
            company_id = %company_id,
            from = %current.id,
            to = %target.id,
            cycle = %cycle,
            superseded = superseded.is_some(),
            "Subscription plan changed"
        );

        Ok((change.record, current.id))
    }

    async fn company(&self, company_id: &str) -> Result<CompanySubscription> {
        self.store
            .get_company(company_id)
            .await?
            .ok_or_else(|| PolicyError::company_not_found(company_id))
    }

    fn plan(&self, plan_id: PlanId, cycle: BillingCycle) -> Result<Plan> {
        self.catalog
            .plan(plan_id, cycle)
            .ok_or_else(|| PolicyError::plan_not_found(plan_id.as_str()))
    }
}

/// End of the first billing period; free plans are open-ended.
fn period_end(plan: &Plan, start: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    if plan.is_free() {
        return Ok(None);
    }
    add_months(start, plan.billing_cycle.months()).map(Some)
}

fn add_months(from: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    from.checked_add_months(Months::new(months))
        .ok_or_else(|| PolicyError::invalid_input(format!("cannot add {} months to {}", months, from)))
}

//! Action authorization against plan limits and features.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::action::{Action, ActionOptions, Gate};
use super::decision::{Decision, DenialReason};
use super::suggestions::{Suggestion, build_suggestions};
use crate::config::PolicyConfig;
use crate::error::{PolicyError, Result};
use crate::plans::{Feature, Limit, PlanCatalog, PlanId, UsageDimension};
use crate::subscription::{ResolvedSubscription, StatusResolver, SubscriptionStatus, SubscriptionStore};
use crate::usage::{UsageAccessor, UsageSource};
use crate::validation::{validate_company_id, validate_package_id};

/// Usage against one limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitStatus {
    pub dimension: UsageDimension,
    pub current: u64,
    pub limit: Limit,
    /// `None` when unlimited.
    pub percent_used: Option<u64>,
    /// Whether creating one more unit would be denied.
    pub blocked: bool,
}

/// Usage against every limit of a company's plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitReport {
    pub company_id: String,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    pub limits: Vec<LimitStatus>,
}

impl LimitReport {
    /// Dimensions where one more unit would be denied.
    pub fn violations(&self) -> impl Iterator<Item = &LimitStatus> {
        self.limits.iter().filter(|l| l.blocked)
    }

    #[must_use]
    pub fn is_within_limits(&self) -> bool {
        self.violations().next().is_none()
    }

    #[must_use]
    pub fn get(&self, dimension: UsageDimension) -> Option<&LimitStatus> {
        self.limits.iter().find(|l| l.dimension == dimension)
    }
}

/// Decides whether a company may perform an action.
pub struct PolicyEngine<S: SubscriptionStore, U: UsageSource> {
    resolver: StatusResolver<S, U>,
    usage: UsageAccessor<U>,
    catalog: Arc<PlanCatalog>,
    config: Arc<PolicyConfig>,
}

impl<S: SubscriptionStore, U: UsageSource> Clone for PolicyEngine<S, U> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            usage: self.usage.clone(),
            catalog: Arc::clone(&self.catalog),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: SubscriptionStore, U: UsageSource> PolicyEngine<S, U> {
    pub fn new(
        resolver: StatusResolver<S, U>,
        usage: UsageAccessor<U>,
        catalog: Arc<PlanCatalog>,
        config: Arc<PolicyConfig>,
    ) -> Self {
        Self {
            resolver,
            usage,
            catalog,
            config,
        }
    }

    pub fn resolver(&self) -> &StatusResolver<S, U> {
        &self.resolver
    }

    /// Check an action given by name.
    ///
    /// Unknown names fail with [`PolicyError::UnknownAction`] before any
    /// store access.
    pub async fn check_action_named(
        &self,
        company_id: &str,
        action: &str,
        options: &ActionOptions,
    ) -> Result<Decision> {
        let action: Action = action.parse()?;
        self.check_action_allowed(company_id, action, options).await
    }

    /// Decide whether `company_id` may perform `action` now.
    ///
    /// Limit-gated actions are checked as a pre-condition: the decision
    /// answers "may one more (or `quantity` more) be created", so usage equal
    /// to the limit is denied.
    pub async fn check_action_allowed(
        &self,
        company_id: &str,
        action: Action,
        options: &ActionOptions,
    ) -> Result<Decision> {
        let quantity = validate_request(company_id, action, options)?;
        let resolved = self.resolver.resolve(company_id).await?;

        let decision = match action.gate() {
            Gate::Feature(feature) => self.check_feature(action, feature, &resolved),
            Gate::Limit(dimension) => {
                self.check_limit(company_id, action, dimension, quantity, options, &resolved)
                    .await?
            }
        };

        if decision.allowed {
            tracing::debug!(
                target: "waymark::policy",
                company_id = %company_id,
                action = %action,
                plan_id = %resolved.plan.id,
                "Action allowed"
            );
        } else {
            tracing::info!(
                target: "waymark::policy",
                company_id = %company_id,
                action = %action,
                plan_id = %resolved.plan.id,
                reason = ?decision.reason,
                current = ?decision.current,
                limit = ?decision.limit,
                "Action denied"
            );
        }

        Ok(decision)
    }

    /// Usage against every limit of the company's plan.
    ///
    /// `blocked` uses the same predicate as [`check_action_allowed`](Self::check_action_allowed)
    /// for a single unit. Photos report the company's fullest package.
    pub async fn validate_subscription_limits(&self, company_id: &str) -> Result<LimitReport> {
        let resolved = self.resolver.resolve(company_id).await?;
        let usage = self.usage.snapshot(company_id).await?;

        let limits = UsageDimension::ALL
            .into_iter()
            .map(|dimension| {
                let limit = resolved.plan.limit(dimension);
                let current = usage.get(dimension);
                LimitStatus {
                    dimension,
                    current,
                    limit,
                    percent_used: limit.percent_used(current),
                    blocked: !limit.admits(current, 1),
                }
            })
            .collect();

        Ok(LimitReport {
            company_id: company_id.to_string(),
            plan_id: resolved.plan.id,
            status: resolved.status(),
            limits,
        })
    }

    /// Upgrade suggestions, most urgent first.
    ///
    /// Companies on the top tier get none, and their usage is not queried.
    pub async fn get_upgrade_suggestions(&self, company_id: &str) -> Result<Vec<Suggestion>> {
        let resolved = self.resolver.resolve(company_id).await?;
        let Some(next) = self.catalog.next_tier(resolved.plan.id) else {
            return Ok(Vec::new());
        };
        let next = self
            .catalog
            .plan(next.id, resolved.plan.billing_cycle)
            .unwrap_or_else(|| next.clone());

        let usage = self.usage.snapshot(company_id).await?;
        Ok(build_suggestions(
            &resolved.plan,
            Some(&next),
            &usage,
            self.config.suggestion_threshold_percent,
        ))
    }

    fn check_feature(
        &self,
        action: Action,
        feature: Feature,
        resolved: &ResolvedSubscription,
    ) -> Decision {
        let plan = &resolved.plan;
        if !plan.has_feature(feature) {
            return Decision::deny(
                action,
                DenialReason::FeatureNotAvailable,
                format!(
                    "{} is not available on the {} plan",
                    capitalize(feature.label()),
                    plan.name
                ),
                &plan.name,
            )
            .with_feature(feature)
            .with_upgrade(self.upgrade_target(plan.id));
        }

        if resolved.status().is_inactive() {
            return self
                .inactive(action, resolved)
                .with_feature(feature);
        }

        Decision::allow(action, &plan.name).with_feature(feature)
    }

    async fn check_limit(
        &self,
        company_id: &str,
        action: Action,
        dimension: UsageDimension,
        quantity: u64,
        options: &ActionOptions,
        resolved: &ResolvedSubscription,
    ) -> Result<Decision> {
        if resolved.status().is_inactive() {
            return Ok(self.inactive(action, resolved));
        }

        let plan = &resolved.plan;
        let limit = plan.limit(dimension);
        let current = match (dimension, options.package_id.as_deref()) {
            (UsageDimension::PhotosPerPackage, Some(package_id)) => {
                self.usage.package_photos(company_id, package_id).await?
            }
            _ => self.usage.count(company_id, dimension).await?,
        };

        if limit.admits(current, quantity) {
            return Ok(Decision::allow(action, &plan.name).with_usage(dimension, limit, current));
        }

        Ok(Decision::deny(
            action,
            DenialReason::LimitReached,
            format!(
                "You have reached the {} plan limit of {} {}",
                plan.name,
                limit,
                dimension.label()
            ),
            &plan.name,
        )
        .with_usage(dimension, limit, current)
        .with_upgrade(self.upgrade_target(plan.id)))
    }

    fn inactive(&self, action: Action, resolved: &ResolvedSubscription) -> Decision {
        Decision::deny(
            action,
            DenialReason::SubscriptionInactive,
            format!(
                "Your subscription is {}. Renew to continue using {}.",
                resolved.status(),
                action
            ),
            &resolved.plan.name,
        )
        .with_upgrade(self.upgrade_target(resolved.plan.id))
    }

    fn upgrade_target(&self, plan_id: PlanId) -> Option<PlanId> {
        self.catalog.next_tier(plan_id).map(|p| p.id)
    }
}

/// Validate everything that does not need the store. Returns the quantity.
fn validate_request(company_id: &str, action: Action, options: &ActionOptions) -> Result<u64> {
    validate_company_id(company_id)?;

    if action.requires_package() {
        let package_id = options
            .package_id
            .as_deref()
            .ok_or_else(|| PolicyError::MissingOption {
                action: action.to_string(),
                option: "package_id".to_string(),
            })?;
        validate_package_id(package_id)?;
    }

    match options.quantity {
        Some(0) => Err(PolicyError::invalid_input("quantity must be greater than 0")),
        Some(n) => Ok(n),
        None => Ok(1),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SharedClock};
    use crate::plans::BillingCycle;
    use crate::subscription::{CompanySubscription, InMemorySubscriptionStore, NoOpAuditLogger};
    use crate::usage::InMemoryUsageSource;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    struct Fixture {
        store: InMemorySubscriptionStore,
        usage: InMemoryUsageSource,
        engine: PolicyEngine<InMemorySubscriptionStore, InMemoryUsageSource>,
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 20, 10, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let store = InMemorySubscriptionStore::new();
        let usage = InMemoryUsageSource::new();
        let clock: SharedClock = Arc::new(FixedClock::new(now()));
        let catalog = Arc::new(PlanCatalog::standard());
        let config = Arc::new(PolicyConfig::default());
        let accessor = UsageAccessor::new(Arc::new(usage.clone()), clock.clone());
        let resolver = StatusResolver::new(
            Arc::new(store.clone()),
            accessor.clone(),
            catalog.clone(),
            config.clone(),
            clock,
            Arc::new(NoOpAuditLogger),
        );
        Fixture {
            store,
            usage,
            engine: PolicyEngine::new(resolver, accessor, catalog, config),
        }
    }

    fn company(plan_id: PlanId, end: Option<DateTime<Utc>>) -> CompanySubscription {
        let plan = PlanCatalog::standard().plan(plan_id, BillingCycle::Monthly).unwrap();
        CompanySubscription::active("acme", &plan, now() - Duration::days(10), end)
    }

    #[tokio::test]
    async fn test_package_limit_boundary() {
        let f = fixture();
        f.store.insert_company(company(PlanId::Basic, None));
        f.usage.add_packages("acme", 9);

        let decision = f
            .engine
            .check_action_allowed("acme", Action::CreatePackage, &ActionOptions::new())
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.current, Some(9));

        f.usage.add_packages("acme", 1);
        let decision = f
            .engine
            .check_action_allowed("acme", Action::CreatePackage, &ActionOptions::new())
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenialReason::LimitReached));
        assert_eq!(decision.limit, Some(Limit::Limited(10)));
        assert_eq!(decision.current, Some(10));
        assert_eq!(decision.upgrade_to, Some(PlanId::Professional));
    }

    #[tokio::test]
    async fn test_quantity_counts_against_limit() {
        let f = fixture();
        f.store.insert_company(company(PlanId::Basic, None));
        f.usage.add_package("acme", "p1", 6);

        let ok = f
            .engine
            .check_action_allowed(
                "acme",
                Action::UploadPhotos,
                &ActionOptions::for_package("p1").with_quantity(4),
            )
            .await
            .unwrap();
        assert!(ok.allowed);

        let denied = f
            .engine
            .check_action_allowed(
                "acme",
                Action::UploadPhotos,
                &ActionOptions::for_package("p1").with_quantity(5),
            )
            .await
            .unwrap();
        assert!(denied.is_denied());
        assert_eq!(denied.dimension, Some(UsageDimension::PhotosPerPackage));
    }

    #[tokio::test]
    async fn test_upload_photos_requires_package_before_store_access() {
        let f = fixture();
        // Store down: validation must fail first.
        f.store.set_unavailable(true);
        let err = f
            .engine
            .check_action_allowed("acme", Action::UploadPhotos, &ActionOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::MissingOption { .. }));

        let err = f
            .engine
            .check_action_named("acme", "teleport", &ActionOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownAction(_)));

        let err = f
            .engine
            .check_action_allowed(
                "acme",
                Action::CreateBooking,
                &ActionOptions::new().with_quantity(0),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_upload_photos_unknown_package() {
        let f = fixture();
        f.store.insert_company(company(PlanId::Basic, None));
        let err = f
            .engine
            .check_action_allowed("acme", Action::UploadPhotos, &ActionOptions::for_package("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::PackageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_expired_denies_limit_actions() {
        let f = fixture();
        f.store
            .insert_company(company(PlanId::Professional, Some(now() - Duration::days(1))));

        let decision = f
            .engine
            .check_action_allowed("acme", Action::CreateBooking, &ActionOptions::new())
            .await
            .unwrap();
        assert_eq!(decision.reason, Some(DenialReason::SubscriptionInactive));

        // Plan has the flag, but the subscription is expired.
        let decision = f
            .engine
            .check_action_allowed("acme", Action::AccessAnalytics, &ActionOptions::new())
            .await
            .unwrap();
        assert_eq!(decision.reason, Some(DenialReason::SubscriptionInactive));
    }

    #[tokio::test]
    async fn test_feature_missing_denied_regardless_of_status() {
        let f = fixture();
        f.store.insert_company(company(PlanId::Basic, None));

        let decision = f
            .engine
            .check_action_allowed("acme", Action::PrioritySupport, &ActionOptions::new())
            .await
            .unwrap();
        assert_eq!(decision.reason, Some(DenialReason::FeatureNotAvailable));
        assert_eq!(decision.feature, Some(Feature::PrioritySupport));
        assert_eq!(
            decision.message.as_deref(),
            Some("Priority support is not available on the Basic plan")
        );

        let decision = f
            .engine
            .check_action_allowed("acme", Action::AccessAnalytics, &ActionOptions::new())
            .await
            .unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_unlimited_never_denies() {
        let f = fixture();
        f.store.insert_company(company(PlanId::Enterprise, None));
        f.usage.add_packages("acme", 50_000);
        f.usage.set_staff_accounts("acme", u64::MAX);

        for action in [Action::CreatePackage, Action::AddStaffAccount] {
            let decision = f
                .engine
                .check_action_allowed("acme", action, &ActionOptions::new())
                .await
                .unwrap();
            assert!(decision.allowed, "{} should be allowed", action);
            assert!(decision.upgrade_to.is_none());
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_not_a_decision() {
        let f = fixture();
        f.store.insert_company(company(PlanId::Basic, None));
        f.usage.set_unavailable(true);

        let err = f
            .engine
            .check_action_allowed("acme", Action::CreatePackage, &ActionOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_limit_report_agrees_with_single_check() {
        let f = fixture();
        f.store.insert_company(company(PlanId::Free, None));
        f.usage.add_packages("acme", 3);
        f.usage.set_documents("acme", 1);

        let report = f.engine.validate_subscription_limits("acme").await.unwrap();
        let packages = report.get(UsageDimension::Packages).unwrap();
        assert!(packages.blocked);
        assert_eq!(packages.percent_used, Some(100));
        let documents = report.get(UsageDimension::CompanyDocuments).unwrap();
        assert!(!documents.blocked);
        assert!(!report.is_within_limits());

        for (action, dimension) in [
            (Action::CreatePackage, UsageDimension::Packages),
            (Action::CreateBooking, UsageDimension::BookingsPerMonth),
            (Action::UploadDocument, UsageDimension::CompanyDocuments),
            (Action::AddStaffAccount, UsageDimension::StaffAccounts),
        ] {
            let decision = f
                .engine
                .check_action_allowed("acme", action, &ActionOptions::new())
                .await
                .unwrap();
            assert_eq!(decision.is_denied(), report.get(dimension).unwrap().blocked);
        }
    }

    #[tokio::test]
    async fn test_suggestions_use_next_tier() {
        let f = fixture();
        f.store.insert_company(company(PlanId::Basic, None));
        f.usage.add_packages("acme", 8);

        let suggestions = f.engine.get_upgrade_suggestions("acme").await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].suggested_plan, PlanId::Professional);
    }

    #[tokio::test]
    async fn test_enterprise_suggestions_skip_usage() {
        let f = fixture();
        f.store.insert_company(company(PlanId::Enterprise, None));
        f.usage.set_unavailable(true);

        let suggestions = f.engine.get_upgrade_suggestions("acme").await.unwrap();
        assert!(suggestions.is_empty());
    }
}

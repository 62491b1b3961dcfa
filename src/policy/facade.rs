use std::future::Future;
use std::sync::Arc;

use super::action::{Action, ActionOptions};
use super::decision::Decision;
use super::engine::{LimitReport, PolicyEngine};
use super::gate::{CreationGate, GateOutcome, check_then_create};
use super::suggestions::Suggestion;
use crate::clock::{SharedClock, SystemClock};
use crate::config::{EnforcementMode, PolicyConfig};
use crate::error::Result;
use crate::plans::{BillingCycle, Plan, PlanCatalog};
use crate::subscription::{
    AuditLogger, StatusResolver, SubscriptionAdmin, SubscriptionStatusReport, SubscriptionStore,
    TracingAuditLogger,
};
use crate::usage::{UsageAccessor, UsageSource};

/// Entry point for plan enforcement.
///
/// Wires the catalog, status resolver, authorization engine and admin
/// operations over one [`SubscriptionStore`] and one [`UsageSource`].
///
/// ```rust,ignore
/// let policy = SubscriptionPolicy::builder(store, usage)
///     .config(PolicyConfig::builder().from_env().build()?)
///     .build();
///
/// let decision = policy
///     .check_action_allowed(&company_id, Action::CreatePackage, &ActionOptions::new())
///     .await?;
/// if !decision.allowed {
///     return Err(ApiError::PlanLimit(decision));
/// }
/// ```
pub struct SubscriptionPolicy<S: SubscriptionStore, U: UsageSource> {
    engine: PolicyEngine<S, U>,
    admin: SubscriptionAdmin<S>,
    gate: CreationGate,
    catalog: Arc<PlanCatalog>,
    config: Arc<PolicyConfig>,
}

impl<S: SubscriptionStore, U: UsageSource> SubscriptionPolicy<S, U> {
    /// Standard catalog, default config, system clock and tracing audit log.
    pub fn new(store: S, usage: U) -> Self {
        Self::builder(store, usage).build()
    }

    pub fn builder(store: S, usage: U) -> SubscriptionPolicyBuilder<S, U> {
        SubscriptionPolicyBuilder {
            store,
            usage,
            catalog: PlanCatalog::standard(),
            config: PolicyConfig::default(),
            clock: Arc::new(SystemClock),
            audit: Arc::new(TracingAuditLogger),
        }
    }

    /// Decide whether a company may perform an action.
    pub async fn check_action_allowed(
        &self,
        company_id: &str,
        action: Action,
        options: &ActionOptions,
    ) -> Result<Decision> {
        self.engine
            .check_action_allowed(company_id, action, options)
            .await
    }

    /// Same as [`check_action_allowed`](Self::check_action_allowed), with the
    /// action given by its snake_case name.
    pub async fn check_action_named(
        &self,
        company_id: &str,
        action: &str,
        options: &ActionOptions,
    ) -> Result<Decision> {
        self.engine
            .check_action_named(company_id, action, options)
            .await
    }

    pub async fn get_subscription_status(&self, company_id: &str) -> Result<SubscriptionStatusReport> {
        self.engine
            .resolver()
            .get_subscription_status(company_id)
            .await
    }

    pub async fn get_upgrade_suggestions(&self, company_id: &str) -> Result<Vec<Suggestion>> {
        self.engine.get_upgrade_suggestions(company_id).await
    }

    pub async fn validate_subscription_limits(&self, company_id: &str) -> Result<LimitReport> {
        self.engine.validate_subscription_limits(company_id).await
    }

    /// Check an action and run `create` only if it is allowed.
    ///
    /// With [`EnforcementMode::Serialized`] the check and `create` run under a
    /// per-company lock; with [`EnforcementMode::Soft`] they do not.
    pub async fn check_and_create<F, Fut, T>(
        &self,
        company_id: &str,
        action: Action,
        options: &ActionOptions,
        create: F,
    ) -> Result<GateOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.config.enforcement {
            EnforcementMode::Serialized => {
                self.gate
                    .check_and_create(&self.engine, company_id, action, options, create)
                    .await
            }
            EnforcementMode::Soft => {
                check_then_create(&self.engine, company_id, action, options, create).await
            }
        }
    }

    /// Monthly variant of a plan by id. Unknown ids return `None`.
    #[must_use]
    pub fn get_plan(&self, plan_id: &str) -> Option<Plan> {
        self.catalog.get_plan(plan_id)
    }

    #[must_use]
    pub fn list_plans(&self, cycle: BillingCycle) -> Vec<Plan> {
        self.catalog.list_plans(cycle)
    }

    #[must_use]
    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Admin plan change operations.
    #[must_use]
    pub fn admin(&self) -> &SubscriptionAdmin<S> {
        &self.admin
    }

    /// The underlying authorization engine.
    #[must_use]
    pub fn engine(&self) -> &PolicyEngine<S, U> {
        &self.engine
    }
}

/// Builder for [`SubscriptionPolicy`].
#[must_use = "builder does nothing until you call build()"]
pub struct SubscriptionPolicyBuilder<S: SubscriptionStore, U: UsageSource> {
    store: S,
    usage: U,
    catalog: PlanCatalog,
    config: PolicyConfig,
    clock: SharedClock,
    audit: Arc<dyn AuditLogger>,
}

impl<S: SubscriptionStore, U: UsageSource> SubscriptionPolicyBuilder<S, U> {
    pub fn catalog(mut self, catalog: PlanCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(mut self, config: PolicyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn build(self) -> SubscriptionPolicy<S, U> {
        let store = Arc::new(self.store);
        let catalog = Arc::new(self.catalog);
        let config = Arc::new(self.config);

        let usage = UsageAccessor::new(Arc::new(self.usage), Arc::clone(&self.clock));
        let resolver = StatusResolver::new(
            Arc::clone(&store),
            usage.clone(),
            Arc::clone(&catalog),
            Arc::clone(&config),
            Arc::clone(&self.clock),
            Arc::clone(&self.audit),
        );
        let engine = PolicyEngine::new(resolver, usage, Arc::clone(&catalog), Arc::clone(&config));
        let admin = SubscriptionAdmin::new(store, Arc::clone(&catalog), self.clock, self.audit);

        tracing::debug!(
            target: "waymark::policy",
            plans = catalog.len(),
            enforcement = %config.enforcement,
            "Subscription policy initialized"
        );

        SubscriptionPolicy {
            engine,
            admin,
            gate: CreationGate::new(),
            catalog,
            config,
        }
    }
}

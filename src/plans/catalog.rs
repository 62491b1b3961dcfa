//! Plan definitions and the plan catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::limits::{Limit, PlanLimits, UsageDimension};
use crate::error::PolicyError;

/// Discount applied to twelve monthly payments when billed yearly.
pub const YEARLY_DISCOUNT_PERCENT: i64 = 20;

/// Subscription tier identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanId {
    Free,
    Basic,
    Professional,
    Enterprise,
}

impl PlanId {
    pub const ALL: [PlanId; 4] = [Self::Free, Self::Basic, Self::Professional, Self::Enterprise];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

impl FromStr for PlanId {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "professional" | "pro" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(PolicyError::plan_not_found(s)),
        }
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing cycle for a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    #[default]
    Monthly,
    Yearly,
}

impl BillingCycle {
    /// Length of one billing period in calendar months.
    #[must_use]
    pub fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl FromStr for BillingCycle {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" | "month" => Ok(Self::Monthly),
            "yearly" | "year" | "annual" => Ok(Self::Yearly),
            other => Err(PolicyError::invalid_input(format!(
                "unknown billing cycle '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A boolean capability granted by a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    PrioritySupport,
    FeaturedListings,
    AnalyticsAccess,
    CustomBranding,
    ApiAccess,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Self::PrioritySupport,
        Self::FeaturedListings,
        Self::AnalyticsAccess,
        Self::CustomBranding,
        Self::ApiAccess,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrioritySupport => "priority_support",
            Self::FeaturedListings => "featured_listings",
            Self::AnalyticsAccess => "analytics_access",
            Self::CustomBranding => "custom_branding",
            Self::ApiAccess => "api_access",
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::PrioritySupport => "priority support",
            Self::FeaturedListings => "featured listings",
            Self::AnalyticsAccess => "analytics",
            Self::CustomBranding => "custom branding",
            Self::ApiAccess => "API access",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Feature flags for a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFeatures {
    pub priority_support: bool,
    pub featured_listings: bool,
    pub analytics_access: bool,
    pub custom_branding: bool,
    pub api_access: bool,
}

impl PlanFeatures {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn all() -> Self {
        Self {
            priority_support: true,
            featured_listings: true,
            analytics_access: true,
            custom_branding: true,
            api_access: true,
        }
    }

    #[must_use]
    pub fn has(&self, feature: Feature) -> bool {
        match feature {
            Feature::PrioritySupport => self.priority_support,
            Feature::FeaturedListings => self.featured_listings,
            Feature::AnalyticsAccess => self.analytics_access,
            Feature::CustomBranding => self.custom_branding,
            Feature::ApiAccess => self.api_access,
        }
    }

    pub fn set(&mut self, feature: Feature, enabled: bool) {
        match feature {
            Feature::PrioritySupport => self.priority_support = enabled,
            Feature::FeaturedListings => self.featured_listings = enabled,
            Feature::AnalyticsAccess => self.analytics_access = enabled,
            Feature::CustomBranding => self.custom_branding = enabled,
            Feature::ApiAccess => self.api_access = enabled,
        }
    }

    /// Enabled features, in declaration order.
    #[must_use]
    pub fn enabled(&self) -> Vec<Feature> {
        Feature::ALL.into_iter().filter(|f| self.has(*f)).collect()
    }
}

/// A subscription plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub description: Option<String>,
    /// Price per billing cycle, in minor currency units.
    pub price_cents: i64,
    /// Lowercase ISO 4217 currency code.
    pub currency: String,
    pub billing_cycle: BillingCycle,
    pub trial_days: u32,
    /// Ordering used for upgrade/downgrade comparisons (higher is better).
    pub rank: u8,
    pub limits: PlanLimits,
    pub features: PlanFeatures,
}

impl Plan {
    #[must_use]
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.has(feature)
    }

    #[must_use]
    pub fn limit(&self, dimension: UsageDimension) -> Limit {
        self.limits.get(dimension)
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.price_cents == 0
    }

    /// Derive the yearly variant of a monthly plan.
    ///
    /// Limits, features, rank and trial length are unchanged; the price is
    /// twelve monthly payments minus [`YEARLY_DISCOUNT_PERCENT`].
    #[must_use]
    pub fn yearly(&self) -> Plan {
        if self.billing_cycle == BillingCycle::Yearly {
            return self.clone();
        }
        Plan {
            price_cents: yearly_price_cents(self.price_cents),
            billing_cycle: BillingCycle::Yearly,
            ..self.clone()
        }
    }

    /// Get the price formatted for display (e.g., "$29.00").
    #[must_use]
    pub fn formatted_price(&self) -> String {
        let symbol = match self.currency.as_str() {
            "usd" => "$",
            "gbp" => "£",
            "eur" => "€",
            other => other,
        };
        let whole = self.price_cents / 100;
        let cents = (self.price_cents % 100).abs();
        format!("{}{}.{:02}", symbol, whole, cents)
    }
}

fn yearly_price_cents(monthly_cents: i64) -> i64 {
    monthly_cents.saturating_mul(12) * (100 - YEARLY_DISCOUNT_PERCENT) / 100
}

/// The set of plans on offer, ordered by rank.
///
/// Only monthly variants are stored; yearly variants are derived on lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Create a builder for constructing a catalog.
    #[must_use]
    pub fn builder() -> PlanCatalogBuilder {
        PlanCatalogBuilder::new()
    }

    /// The marketplace's standard four-tier catalog.
    #[must_use]
    pub fn standard() -> Self {
        Self::builder()
            .plan(PlanId::Free)
                .name("Free")
                .description("Try the marketplace with a handful of packages")
                .price_cents(0)
                .trial_days(0)
                .max_packages(3)
                .max_bookings_per_month(10)
                .max_photos_per_package(5)
                .max_company_documents(2)
                .max_staff_accounts(1)
                .done()
            .plan(PlanId::Basic)
                .name("Basic")
                .description("For small agencies getting started")
                .price_cents(2900)
                .trial_days(14)
                .max_packages(10)
                .max_bookings_per_month(100)
                .max_photos_per_package(10)
                .max_company_documents(5)
                .max_staff_accounts(3)
                .features([Feature::AnalyticsAccess])
                .done()
            .plan(PlanId::Professional)
                .name("Professional")
                .description("For growing tour operators")
                .price_cents(7900)
                .trial_days(14)
                .max_packages(50)
                .max_bookings_per_month(1000)
                .max_photos_per_package(30)
                .max_company_documents(25)
                .max_staff_accounts(10)
                .features([
                    Feature::AnalyticsAccess,
                    Feature::PrioritySupport,
                    Feature::FeaturedListings,
                    Feature::CustomBranding,
                ])
                .done()
            .plan(PlanId::Enterprise)
                .name("Enterprise")
                .description("Unlimited listings and every feature")
                .price_cents(19900)
                .trial_days(30)
                .limits(PlanLimits::unlimited())
                .features(Feature::ALL)
                .done()
            .build()
    }

    /// Get the monthly variant of a plan by its string id.
    ///
    /// Unknown ids return `None`.
    #[must_use]
    pub fn get_plan(&self, plan_id: &str) -> Option<Plan> {
        let id = plan_id.parse::<PlanId>().ok()?;
        self.get(id).cloned()
    }

    /// Get the monthly variant of a plan.
    #[must_use]
    pub fn get(&self, plan_id: PlanId) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }

    /// Get a plan for a specific billing cycle.
    #[must_use]
    pub fn plan(&self, plan_id: PlanId, cycle: BillingCycle) -> Option<Plan> {
        self.get(plan_id).map(|p| match cycle {
            BillingCycle::Monthly => p.clone(),
            BillingCycle::Yearly => p.yearly(),
        })
    }

    /// All plans for a billing cycle, ordered by rank.
    #[must_use]
    pub fn list_plans(&self, cycle: BillingCycle) -> Vec<Plan> {
        self.plans
            .iter()
            .map(|p| match cycle {
                BillingCycle::Monthly => p.clone(),
                BillingCycle::Yearly => p.yearly(),
            })
            .collect()
    }

    /// The plan ranked immediately above `plan_id`.
    ///
    /// Plans sharing a rank are peers and never each other's next tier.
    #[must_use]
    pub fn next_tier(&self, plan_id: PlanId) -> Option<&Plan> {
        let rank = self.get(plan_id)?.rank;
        self.plans.iter().find(|p| p.rank > rank)
    }

    /// Whether no plan ranks above `plan_id`.
    #[must_use]
    pub fn is_top_tier(&self, plan_id: PlanId) -> bool {
        self.get(plan_id).is_some() && self.next_tier(plan_id).is_none()
    }

    #[must_use]
    pub fn contains(&self, plan_id: PlanId) -> bool {
        self.get(plan_id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plan> {
        self.plans.iter()
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Builder for a plan catalog.
#[derive(Debug, Default)]
pub struct PlanCatalogBuilder {
    plans: Vec<Plan>,
}

impl PlanCatalogBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start defining a plan.
    ///
    /// Rank defaults to one above the highest rank defined so far. Redefining
    /// an id replaces it and keeps its rank unless a new one is set.
    #[must_use]
    pub fn plan(self, id: PlanId) -> PlanBuilder {
        let rank = match self.plans.iter().find(|p| p.id == id) {
            Some(existing) => existing.rank,
            None => self
                .plans
                .iter()
                .map(|p| p.rank.saturating_add(1))
                .max()
                .unwrap_or(0),
        };
        PlanBuilder {
            plan: Plan {
                id,
                name: default_name(id),
                description: None,
                price_cents: 0,
                currency: "usd".to_string(),
                billing_cycle: BillingCycle::Monthly,
                trial_days: 0,
                rank,
                limits: PlanLimits::unlimited(),
                features: PlanFeatures::none(),
            },
            parent: self,
        }
    }

    /// Build the catalog, ordering plans by rank.
    #[must_use]
    pub fn build(mut self) -> PlanCatalog {
        self.plans.sort_by_key(|p| p.rank);
        PlanCatalog { plans: self.plans }
    }

    fn add_plan(mut self, plan: Plan) -> Self {
        self.plans.retain(|p| p.id != plan.id);
        self.plans.push(plan);
        self
    }
}

fn default_name(id: PlanId) -> String {
    let s = id.as_str();
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Builder for a single plan.
#[derive(Debug)]
pub struct PlanBuilder {
    parent: PlanCatalogBuilder,
    plan: Plan,
}

impl PlanBuilder {
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.plan.name = name.to_string();
        self
    }

    #[must_use]
    pub fn description(mut self, desc: &str) -> Self {
        self.plan.description = Some(desc.to_string());
        self
    }

    /// Monthly price in minor currency units.
    #[must_use]
    pub fn price_cents(mut self, cents: i64) -> Self {
        self.plan.price_cents = cents;
        self
    }

    #[must_use]
    pub fn currency(mut self, currency: &str) -> Self {
        self.plan.currency = currency.to_lowercase();
        self
    }

    #[must_use]
    pub fn trial_days(mut self, days: u32) -> Self {
        self.plan.trial_days = days;
        self
    }

    #[must_use]
    pub fn rank(mut self, rank: u8) -> Self {
        self.plan.rank = rank;
        self
    }

    #[must_use]
    pub fn limit(mut self, dimension: UsageDimension, limit: Limit) -> Self {
        self.plan.limits.set(dimension, limit);
        self
    }

    #[must_use]
    pub fn max_packages(self, max: u64) -> Self {
        self.limit(UsageDimension::Packages, Limit::Limited(max))
    }

    #[must_use]
    pub fn max_bookings_per_month(self, max: u64) -> Self {
        self.limit(UsageDimension::BookingsPerMonth, Limit::Limited(max))
    }

    #[must_use]
    pub fn max_photos_per_package(self, max: u64) -> Self {
        self.limit(UsageDimension::PhotosPerPackage, Limit::Limited(max))
    }

    #[must_use]
    pub fn max_company_documents(self, max: u64) -> Self {
        self.limit(UsageDimension::CompanyDocuments, Limit::Limited(max))
    }

    #[must_use]
    pub fn max_staff_accounts(self, max: u64) -> Self {
        self.limit(UsageDimension::StaffAccounts, Limit::Limited(max))
    }

    #[must_use]
    pub fn limits(mut self, limits: PlanLimits) -> Self {
        self.plan.limits = limits;
        self
    }

    #[must_use]
    pub fn feature(mut self, feature: Feature) -> Self {
        self.plan.features.set(feature, true);
        self
    }

    #[must_use]
    pub fn features<I>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = Feature>,
    {
        for feature in features {
            self.plan.features.set(feature, true);
        }
        self
    }

    /// Finish defining this plan and return to the catalog builder.
    #[must_use]
    pub fn done(self) -> PlanCatalogBuilder {
        self.parent.add_plan(self.plan)
    }
}

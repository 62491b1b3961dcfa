//! Plan catalog: tiers, limits and feature flags.
//!
//! Plans are defined in code and are immutable at runtime. Each plan carries
//! a [`PlanLimits`] of [`Limit`] values and a set of [`PlanFeatures`].
//!
//! # Example
//!
//! ```rust,ignore
//! use waymark::plans::{PlanCatalog, PlanId, Feature};
//!
//! let catalog = PlanCatalog::builder()
//!     .plan(PlanId::Free)
//!         .max_packages(3)
//!         .done()
//!     .plan(PlanId::Basic)
//!         .price_cents(2900)
//!         .max_packages(10)
//!         .features([Feature::AnalyticsAccess])
//!         .trial_days(14)
//!         .done()
//!     .build();
//!
//! assert!(catalog.get_plan("basic").is_some());
//! ```

mod catalog;
mod limits;

pub use catalog::{
    BillingCycle, Feature, Plan, PlanBuilder, PlanCatalog, PlanCatalogBuilder, PlanFeatures,
    PlanId, YEARLY_DISCOUNT_PERCENT,
};
pub use limits::{Limit, PlanLimits, UsageDimension};

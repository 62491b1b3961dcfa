//! Waymark - subscription plan enforcement for a travel booking marketplace
//!
//! Agencies (companies) list travel packages and take bookings. Each company
//! is on a plan that caps what it can create and gates premium features.
//! Waymark answers "may this company do this now?" and keeps the subscription
//! state those answers depend on.
//!
//! # Features
//!
//! - **Plans**: tiered catalog with explicit `Unlimited` limits and yearly pricing
//! - **Authorization**: allow/deny decisions with reasons and upgrade targets
//! - **Status**: lazy expiry, near-expiry and near-limit warnings
//! - **Suggestions**: usage-driven upgrade recommendations
//! - **Admin**: trials, activation, upgrades, downgrades, extension, cancellation
//! - **HTTP**: axum routes exposing the above as JSON
//! - **Storage**: in-memory backends, SeaORM behind the `seaorm` feature
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use waymark::{
//!     Action, ActionOptions, CompanySubscription, InMemorySubscriptionStore,
//!     InMemoryUsageSource, SubscriptionPolicy,
//! };
//!
//! #[tokio::main]
//! async fn main() -> waymark::Result<()> {
//!     waymark::init_tracing();
//!
//!     let store = InMemorySubscriptionStore::new();
//!     store.insert_company(CompanySubscription::free("agency-1"));
//!
//!     let policy = SubscriptionPolicy::new(store, InMemoryUsageSource::new());
//!     let decision = policy
//!         .check_action_allowed("agency-1", Action::CreatePackage, &ActionOptions::new())
//!         .await?;
//!     assert!(decision.allowed);
//!     Ok(())
//! }
//! ```

pub mod clock;
mod config;
mod error;
pub mod http;
pub mod plans;
pub mod policy;
#[cfg(feature = "seaorm")]
pub mod sea_orm_store;
pub mod subscription;
pub mod usage;
mod utils;
pub mod validation;

// Re-exports for public API
pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use config::{EnforcementMode, LoggingConfig, PolicyConfig, PolicyConfigBuilder};
pub use error::{ErrorResponse, PolicyError, Result};
pub use plans::{
    BillingCycle, Feature, Limit, Plan, PlanCatalog, PlanCatalogBuilder, PlanId, PlanLimits,
    UsageDimension,
};
pub use policy::{
    Action, ActionOptions, Decision, DenialReason, GateOutcome, LimitReport, LimitStatus,
    Suggestion, SubscriptionPolicy, SubscriptionPolicyBuilder, Urgency,
};
#[cfg(feature = "seaorm")]
pub use sea_orm_store::SeaOrmPolicyStore;
pub use subscription::{
    AuditLogger, CompanySubscription, InMemorySubscriptionStore, SubscriptionAdmin,
    SubscriptionRecord, SubscriptionStatus, SubscriptionStatusReport, SubscriptionStore, Warning,
};
pub use usage::{InMemoryUsageSource, UsageSnapshot, UsageSource};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "waymark::policy=debug")
/// - `WAYMARK_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = utils::get_env_with_prefix("LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    install(env_filter, json_logs);
}

/// Initialize tracing from a [`PolicyConfig`]'s logging section
pub fn init_tracing_with_config(config: &PolicyConfig) {
    install(EnvFilter::new(&config.logging.level), config.logging.json);
}

fn install(env_filter: EnvFilter, json: bool) {
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

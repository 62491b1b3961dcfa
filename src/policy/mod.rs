//! Plan enforcement: action checks, limit reports and upgrade suggestions.
//!
//! Most callers only need [`SubscriptionPolicy`]:
//!
//! ```rust,ignore
//! use waymark::policy::{Action, ActionOptions, SubscriptionPolicy};
//!
//! let policy = SubscriptionPolicy::new(store, usage);
//!
//! let decision = policy
//!     .check_action_allowed("agency_42", Action::UploadPhotos, &ActionOptions::for_package("pkg_7"))
//!     .await?;
//!
//! if !decision.allowed {
//!     // decision.reason, decision.message, decision.upgrade_to
//! }
//! ```
//!
//! Checks are soft by default: the limit can be overshot by concurrent
//! requests that all pass the check before any of them creates. Use
//! [`SubscriptionPolicy::check_and_create`] with
//! [`EnforcementMode::Serialized`](crate::EnforcementMode) to serialize
//! per company within one process.

mod action;
mod decision;
mod engine;
mod facade;
mod gate;
mod suggestions;

pub use action::{Action, ActionOptions, Gate};
pub use decision::{Decision, DenialReason};
pub use engine::{LimitReport, LimitStatus, PolicyEngine};
pub use facade::{SubscriptionPolicy, SubscriptionPolicyBuilder};
pub use gate::{CreationGate, GateOutcome};
pub use suggestions::{Suggestion, Urgency, build_suggestions};

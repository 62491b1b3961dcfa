//! Company subscriptions: status, history and plan changes.
//!
//! - [`StatusResolver`] derives a company's effective status from stored dates
//!   and reconciles the stored projection lazily.
//! - [`SubscriptionAdmin`] records admin plan changes as append-only history
//!   plus a projection update, written together through [`SubscriptionStore`].
//! - [`AuditLogger`] receives one event per change.

mod admin;
pub mod audit;
mod in_memory;
mod resolver;
mod storage;
mod types;

pub use admin::SubscriptionAdmin;
pub use audit::{AuditLogger, NoOpAuditLogger, SubscriptionAuditEvent, TracingAuditLogger};
pub use in_memory::InMemorySubscriptionStore;
pub use resolver::{
    ResolvedSubscription, Severity, StatusResolver, SubscriptionStatusReport, Warning, WarningKind,
    derive_status,
};
pub use storage::{Cancellation, PlanChange, Reconciliation, SubscriptionStore};
pub use types::{CompanySubscription, RecordStatus, SubscriptionRecord, SubscriptionStatus};

//! Audit logging for subscription changes.
//!
//! Every admin plan change emits one event. The default logger writes them to
//! `tracing` under the `waymark::audit` target.

use async_trait::async_trait;
use std::fmt;

use crate::plans::PlanId;

/// Audit event types for subscription operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionAuditEvent {
    TrialStarted {
        company_id: String,
        plan_id: PlanId,
        actor_id: String,
        trial_days: u32,
    },
    PlanActivated {
        company_id: String,
        plan_id: PlanId,
        actor_id: String,
        record_id: String,
    },
    PlanChanged {
        company_id: String,
        from_plan: PlanId,
        to_plan: PlanId,
        actor_id: String,
        record_id: String,
    },
    SubscriptionExtended {
        company_id: String,
        plan_id: PlanId,
        actor_id: String,
        months: u32,
        record_id: String,
    },
    SubscriptionCancelled {
        company_id: String,
        actor_id: String,
        record_id: String,
        reason: Option<String>,
    },
    /// The resolver persisted a date-driven status transition.
    StatusReconciled {
        company_id: String,
        from_status: String,
        to_status: String,
    },
}

impl SubscriptionAuditEvent {
    /// Get the event kind as a string for structured logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TrialStarted { .. } => "trial_started",
            Self::PlanActivated { .. } => "plan_activated",
            Self::PlanChanged { .. } => "plan_changed",
            Self::SubscriptionExtended { .. } => "subscription_extended",
            Self::SubscriptionCancelled { .. } => "subscription_cancelled",
            Self::StatusReconciled { .. } => "status_reconciled",
        }
    }

    #[must_use]
    pub fn company_id(&self) -> &str {
        match self {
            Self::TrialStarted { company_id, .. }
            | Self::PlanActivated { company_id, .. }
            | Self::PlanChanged { company_id, .. }
            | Self::SubscriptionExtended { company_id, .. }
            | Self::SubscriptionCancelled { company_id, .. }
            | Self::StatusReconciled { company_id, .. } => company_id,
        }
    }
}

impl fmt::Display for SubscriptionAuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrialStarted { company_id, plan_id, actor_id, trial_days } => {
                write!(f, "Trial started: company={}, plan={}, actor={}, days={}", company_id, plan_id, actor_id, trial_days)
            }
            Self::PlanActivated { company_id, plan_id, actor_id, record_id } => {
                write!(f, "Plan activated: company={}, plan={}, actor={}, record={}", company_id, plan_id, actor_id, record_id)
            }
            Self::PlanChanged { company_id, from_plan, to_plan, actor_id, record_id } => {
                write!(f, "Plan changed: company={}, from={}, to={}, actor={}, record={}", company_id, from_plan, to_plan, actor_id, record_id)
            }
            Self::SubscriptionExtended { company_id, plan_id, actor_id, months, record_id } => {
                write!(f, "Subscription extended: company={}, plan={}, actor={}, months={}, record={}", company_id, plan_id, actor_id, months, record_id)
            }
            Self::SubscriptionCancelled { company_id, actor_id, record_id, reason } => {
                write!(f, "Subscription cancelled: company={}, actor={}, record={}, reason={}", company_id, actor_id, record_id, reason.as_deref().unwrap_or("none"))
            }
            Self::StatusReconciled { company_id, from_status, to_status } => {
                write!(f, "Status reconciled: company={}, from={}, to={}", company_id, from_status, to_status)
            }
        }
    }
}

/// Trait for audit logging backends.
///
/// Implementations should handle their own failures (e.g. log to stderr)
/// rather than disrupting the plan change that produced the event.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log(&self, event: SubscriptionAuditEvent);
}

/// No-op audit logger that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditLogger;

#[async_trait]
impl AuditLogger for NoOpAuditLogger {
    async fn log(&self, _event: SubscriptionAuditEvent) {}
}

/// Tracing-based audit logger.
///
/// Logs audit events using the `tracing` crate at INFO level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, event: SubscriptionAuditEvent) {
        tracing::info!(
            target: "waymark::audit",
            event_type = event.kind(),
            company_id = event.company_id(),
            "{}", event
        );
    }
}

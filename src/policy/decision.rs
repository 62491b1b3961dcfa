use serde::{Deserialize, Serialize};
use std::fmt;

use super::action::Action;
use crate::plans::{Feature, Limit, PlanId, UsageDimension};

/// Why an action was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Subscription is expired or cancelled.
    SubscriptionInactive,
    /// The plan does not include the feature.
    FeatureNotAvailable,
    /// One more unit would exceed the plan limit.
    LimitReached,
}

impl DenialReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubscriptionInactive => "subscription_inactive",
            Self::FeatureNotAvailable => "feature_not_available",
            Self::LimitReached => "limit_reached",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of an authorization check.
///
/// A denial is a normal value, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub action: Action,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<UsageDimension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<Limit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<Feature>,
    pub plan_name: String,
    /// Next tier up, when one exists. Only set on denials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_to: Option<PlanId>,
}

impl Decision {
    pub(crate) fn allow(action: Action, plan_name: impl Into<String>) -> Self {
        Self {
            action,
            allowed: true,
            reason: None,
            message: None,
            dimension: None,
            limit: None,
            current: None,
            feature: None,
            plan_name: plan_name.into(),
            upgrade_to: None,
        }
    }

    pub(crate) fn deny(
        action: Action,
        reason: DenialReason,
        message: impl Into<String>,
        plan_name: impl Into<String>,
    ) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            message: Some(message.into()),
            ..Self::allow(action, plan_name)
        }
    }

    pub(crate) fn with_usage(mut self, dimension: UsageDimension, limit: Limit, current: u64) -> Self {
        self.dimension = Some(dimension);
        self.limit = Some(limit);
        self.current = Some(current);
        self
    }

    pub(crate) fn with_feature(mut self, feature: Feature) -> Self {
        self.feature = Some(feature);
        self
    }

    pub(crate) fn with_upgrade(mut self, upgrade_to: Option<PlanId>) -> Self {
        self.upgrade_to = upgrade_to;
        self
    }

    #[must_use]
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_serializes_reason() {
        let decision = Decision::deny(
            Action::CreatePackage,
            DenialReason::LimitReached,
            "limit reached",
            "Basic",
        )
        .with_usage(UsageDimension::Packages, Limit::Limited(10), 10)
        .with_upgrade(Some(PlanId::Professional));

        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["allowed"], false);
        assert_eq!(json["reason"], "limit_reached");
        assert_eq!(json["limit"], 10);
        assert_eq!(json["current"], 10);
        assert_eq!(json["upgradeTo"], "professional");
        assert_eq!(json["planName"], "Basic");
    }

    #[test]
    fn test_allow_omits_denial_fields() {
        let json = serde_json::to_value(Decision::allow(Action::AccessAnalytics, "Basic")).unwrap();
        assert_eq!(json["allowed"], true);
        assert!(json.get("reason").is_none());
        assert!(json.get("upgradeTo").is_none());
    }
}

//! Upgrade suggestions derived from usage.

use serde::{Deserialize, Serialize};

use crate::plans::{Feature, Plan, PlanId, UsageDimension};
use crate::usage::UsageSnapshot;

/// How pressing a suggestion is. Sorts most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// A limit is fully used.
    Critical,
    /// A limit is past the suggestion threshold.
    Recommended,
    /// Feature upsell; no limit pressure.
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub urgency: Urgency,
    /// The limit driving the suggestion; `None` for feature upsells.
    pub dimension: Option<UsageDimension>,
    pub suggested_plan: PlanId,
    /// Short call to action.
    pub suggestion: String,
    pub reason: String,
}

/// Build suggestions for a company on `plan` with `usage`.
///
/// `next` is the plan ranked immediately above `plan`; with none, the company
/// is on the top tier and nothing is suggested. A limit only produces a
/// suggestion when `next` raises it.
#[must_use]
pub fn build_suggestions(
    plan: &Plan,
    next: Option<&Plan>,
    usage: &UsageSnapshot,
    threshold_percent: u8,
) -> Vec<Suggestion> {
    let Some(next) = next else {
        return Vec::new();
    };

    let mut suggestions = Vec::new();
    for dimension in UsageDimension::ALL {
        let limit = plan.limit(dimension);
        if limit.is_unlimited() || next.limit(dimension) <= limit {
            continue;
        }

        let current = usage.get(dimension);
        let urgency = if limit.reached_percent(current, 100) {
            Urgency::Critical
        } else if limit.reached_percent(current, threshold_percent) {
            Urgency::Recommended
        } else {
            continue;
        };

        suggestions.push(Suggestion {
            urgency,
            dimension: Some(dimension),
            suggested_plan: next.id,
            suggestion: format!(
                "Upgrade to {} for up to {} {}",
                next.name,
                next.limit(dimension),
                dimension.label()
            ),
            reason: format!(
                "You are using {} of {} {} on the {} plan",
                current,
                limit,
                dimension.label(),
                plan.name
            ),
        });
    }

    if !plan.has_feature(Feature::AnalyticsAccess) && next.has_feature(Feature::AnalyticsAccess) {
        suggestions.push(Suggestion {
            urgency: Urgency::Optional,
            dimension: None,
            suggested_plan: next.id,
            suggestion: format!("Upgrade to {} to unlock analytics", next.name),
            reason: format!("Analytics is not included in the {} plan", plan.name),
        });
    }

    suggestions.sort_by_key(|s| s.urgency);
    suggestions
}

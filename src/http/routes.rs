use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;

use super::response::{ApiResponse, ApiResult};
use crate::error::PolicyError;
use crate::plans::{BillingCycle, Plan};
use crate::policy::{ActionOptions, Decision, LimitReport, Suggestion, SubscriptionPolicy};
use crate::subscription::{SubscriptionStatusReport, SubscriptionStore};
use crate::usage::UsageSource;

type SharedPolicy<S, U> = Arc<SubscriptionPolicy<S, U>>;

/// Build the plan enforcement router.
///
/// | Method | Path |
/// |---|---|
/// | GET | `/plans?cycle=monthly\|yearly` |
/// | GET | `/plans/{plan_id}` |
/// | GET | `/companies/{company_id}/subscription` |
/// | POST | `/companies/{company_id}/actions/{action}/check` |
/// | GET | `/companies/{company_id}/limits` |
/// | GET | `/companies/{company_id}/suggestions` |
pub fn routes<S, U>(policy: SharedPolicy<S, U>) -> Router
where
    S: SubscriptionStore + 'static,
    U: UsageSource + 'static,
{
    Router::new()
        .route("/plans", get(list_plans::<S, U>))
        .route("/plans/{plan_id}", get(get_plan::<S, U>))
        .route(
            "/companies/{company_id}/subscription",
            get(subscription_status::<S, U>),
        )
        .route(
            "/companies/{company_id}/actions/{action}/check",
            post(check_action::<S, U>),
        )
        .route("/companies/{company_id}/limits", get(limits::<S, U>))
        .route(
            "/companies/{company_id}/suggestions",
            get(suggestions::<S, U>),
        )
        .with_state(policy)
}

#[derive(Debug, Default, Deserialize)]
struct PlansQuery {
    cycle: Option<String>,
}

async fn list_plans<S, U>(
    State(policy): State<SharedPolicy<S, U>>,
    Query(query): Query<PlansQuery>,
) -> ApiResult<Vec<Plan>>
where
    S: SubscriptionStore + 'static,
    U: UsageSource + 'static,
{
    let cycle = match query.cycle.as_deref() {
        Some(raw) => raw.parse::<BillingCycle>()?,
        None => BillingCycle::Monthly,
    };
    Ok(ApiResponse::success(policy.list_plans(cycle)))
}

async fn get_plan<S, U>(
    State(policy): State<SharedPolicy<S, U>>,
    Path(plan_id): Path<String>,
) -> ApiResult<Plan>
where
    S: SubscriptionStore + 'static,
    U: UsageSource + 'static,
{
    policy
        .get_plan(&plan_id)
        .map(ApiResponse::success)
        .ok_or_else(|| PolicyError::plan_not_found(plan_id))
}

async fn subscription_status<S, U>(
    State(policy): State<SharedPolicy<S, U>>,
    Path(company_id): Path<String>,
) -> ApiResult<SubscriptionStatusReport>
where
    S: SubscriptionStore + 'static,
    U: UsageSource + 'static,
{
    let report = policy.get_subscription_status(&company_id).await?;
    Ok(ApiResponse::success(report))
}

/// Denials are answered with 200 and `allowed: false`; the decision's
/// message is copied into the envelope.
async fn check_action<S, U>(
    State(policy): State<SharedPolicy<S, U>>,
    Path((company_id, action)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Decision>
where
    S: SubscriptionStore + 'static,
    U: UsageSource + 'static,
{
    let options = parse_options(&body)?;
    let decision = policy
        .check_action_named(&company_id, &action, &options)
        .await?;

    Ok(match decision.message.clone() {
        Some(message) => ApiResponse::success_with_message(decision, message),
        None => ApiResponse::success(decision),
    })
}

async fn limits<S, U>(
    State(policy): State<SharedPolicy<S, U>>,
    Path(company_id): Path<String>,
) -> ApiResult<LimitReport>
where
    S: SubscriptionStore + 'static,
    U: UsageSource + 'static,
{
    let report = policy.validate_subscription_limits(&company_id).await?;
    Ok(ApiResponse::success(report))
}

async fn suggestions<S, U>(
    State(policy): State<SharedPolicy<S, U>>,
    Path(company_id): Path<String>,
) -> ApiResult<Vec<Suggestion>>
where
    S: SubscriptionStore + 'static,
    U: UsageSource + 'static,
{
    let suggestions = policy.get_upgrade_suggestions(&company_id).await?;
    Ok(ApiResponse::success(suggestions))
}

/// An empty body means default options.
fn parse_options(body: &[u8]) -> Result<ActionOptions, PolicyError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ActionOptions::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| PolicyError::invalid_input(format!("invalid action options: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_body() {
        assert_eq!(parse_options(b"").unwrap(), ActionOptions::default());
        assert_eq!(parse_options(b"  \n").unwrap(), ActionOptions::default());
    }

    #[test]
    fn test_parse_options_accepts_both_casings() {
        let camel = parse_options(br#"{"packageId":"pkg-1"}"#).unwrap();
        let snake = parse_options(br#"{"package_id":"pkg-1"}"#).unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.package_id.as_deref(), Some("pkg-1"));
    }

    #[test]
    fn test_parse_malformed_body() {
        let err = parse_options(b"{not json").unwrap_err();
        assert!(err.is_invalid_input());
    }
}

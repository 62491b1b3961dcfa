use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for policy operations.
///
/// Policy denials are *not* errors: a disallowed action is reported through
/// [`Decision`](crate::policy::Decision). This type covers the outcomes a
/// caller must handle distinctly from a denial.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    // Not found
    #[error("Company not found: {company_id}")]
    CompanyNotFound { company_id: String },

    #[error("Plan not found: {plan_id}")]
    PlanNotFound { plan_id: String },

    #[error("Package '{package_id}' not found for company '{company_id}'")]
    PackageNotFound { company_id: String, package_id: String },

    // Invalid input
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Action '{action}' requires option '{option}'")]
    MissingOption { action: String, option: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid plan change: {0}")]
    InvalidPlanChange(String),

    #[error("No active subscription for company '{company_id}'")]
    NoActiveSubscription { company_id: String },

    // Transient
    #[error("Store unavailable during '{operation}': {message}")]
    StoreUnavailable { operation: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

impl PolicyError {
    pub fn company_not_found(company_id: impl Into<String>) -> Self {
        Self::CompanyNotFound {
            company_id: company_id.into(),
        }
    }

    pub fn plan_not_found(plan_id: impl Into<String>) -> Self {
        Self::PlanNotFound {
            plan_id: plan_id.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_plan_change(msg: impl Into<String>) -> Self {
        Self::InvalidPlanChange(msg.into())
    }

    pub fn store(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Unknown company, plan or package.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CompanyNotFound { .. } | Self::PlanNotFound { .. } | Self::PackageNotFound { .. }
        )
    }

    /// The caller supplied something the engine cannot act on.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::UnknownAction(_)
                | Self::MissingOption { .. }
                | Self::InvalidInput(_)
                | Self::InvalidPlanChange(_)
                | Self::NoActiveSubscription { .. }
        )
    }

    /// Whether retrying the operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Short machine-readable kind for JSON responses and log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CompanyNotFound { .. } => "company_not_found",
            Self::PlanNotFound { .. } => "plan_not_found",
            Self::PackageNotFound { .. } => "package_not_found",
            Self::UnknownAction(_) => "unknown_action",
            Self::MissingOption { .. } => "missing_option",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidPlanChange(_) => "invalid_plan_change",
            Self::NoActiveSubscription { .. } => "no_active_subscription",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::Config(_) => "config",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::CompanyNotFound { .. } | Self::PlanNotFound { .. } | Self::PackageNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            Self::UnknownAction(_) | Self::MissingOption { .. } | Self::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidPlanChange(_) | Self::NoActiveSubscription { .. } => StatusCode::CONFLICT,
            Self::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a message suitable for clients.
    ///
    /// Client errors (4xx) are returned verbatim. Server errors only expose a
    /// generic message; the details are logged server-side.
    fn safe_message(&self) -> String {
        match self {
            Self::StoreUnavailable { .. } => "Service unavailable".to_string(),
            Self::Config(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// JSON body for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    success: bool,
    error: String,
    kind: &'static str,
    error_id: String,
}

impl IntoResponse for PolicyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_id = %error_id,
                kind = self.kind(),
                error = %self,
                "Request failed"
            );
        } else {
            tracing::debug!(
                status = status.as_u16(),
                error_id = %error_id,
                kind = self.kind(),
                error = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            success: false,
            error: self.safe_message(),
            kind: self.kind(),
            error_id,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(feature = "seaorm")]
impl From<sea_orm::DbErr> for PolicyError {
    fn from(err: sea_orm::DbErr) -> Self {
        PolicyError::store("database", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PolicyError::plan_not_found("platinum");
        assert_eq!(err.to_string(), "Plan not found: platinum");

        let err = PolicyError::MissingOption {
            action: "upload_photos".to_string(),
            option: "package_id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Action 'upload_photos' requires option 'package_id'"
        );
    }

    #[test]
    fn test_error_classification() {
        let err = PolicyError::company_not_found("acme");
        assert!(err.is_not_found());
        assert!(!err.is_invalid_input());
        assert!(!err.is_transient());

        let err = PolicyError::UnknownAction("teleport".to_string());
        assert!(err.is_invalid_input());
        assert!(!err.is_not_found());

        let err = PolicyError::store("count_packages", "connection refused");
        assert!(err.is_transient());
        assert!(!err.is_not_found());
        assert!(!err.is_invalid_input());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            PolicyError::company_not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PolicyError::invalid_input("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PolicyError::invalid_plan_change("same plan").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            PolicyError::store("op", "down").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_safe_message_hides_store_details() {
        let err = PolicyError::store("count_bookings", "password authentication failed");
        assert_eq!(err.safe_message(), "Service unavailable");

        let err = PolicyError::company_not_found("acme");
        assert_eq!(err.safe_message(), "Company not found: acme");
    }
}

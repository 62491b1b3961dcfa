use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PolicyError;
use crate::plans::{Feature, UsageDimension};

/// A company action subject to plan enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreatePackage,
    CreateBooking,
    UploadPhotos,
    UploadDocument,
    AddStaffAccount,
    AccessAnalytics,
    PrioritySupport,
    FeaturedListings,
    CustomBranding,
    ApiAccess,
}

/// What an action is gated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Counted against a plan limit.
    Limit(UsageDimension),
    /// Requires a plan feature flag.
    Feature(Feature),
}

impl Action {
    pub const ALL: [Action; 10] = [
        Self::CreatePackage,
        Self::CreateBooking,
        Self::UploadPhotos,
        Self::UploadDocument,
        Self::AddStaffAccount,
        Self::AccessAnalytics,
        Self::PrioritySupport,
        Self::FeaturedListings,
        Self::CustomBranding,
        Self::ApiAccess,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatePackage => "create_package",
            Self::CreateBooking => "create_booking",
            Self::UploadPhotos => "upload_photos",
            Self::UploadDocument => "upload_document",
            Self::AddStaffAccount => "add_staff_account",
            Self::AccessAnalytics => "access_analytics",
            Self::PrioritySupport => "priority_support",
            Self::FeaturedListings => "featured_listings",
            Self::CustomBranding => "custom_branding",
            Self::ApiAccess => "api_access",
        }
    }

    #[must_use]
    pub fn gate(&self) -> Gate {
        match self {
            Self::CreatePackage => Gate::Limit(UsageDimension::Packages),
            Self::CreateBooking => Gate::Limit(UsageDimension::BookingsPerMonth),
            Self::UploadPhotos => Gate::Limit(UsageDimension::PhotosPerPackage),
            Self::UploadDocument => Gate::Limit(UsageDimension::CompanyDocuments),
            Self::AddStaffAccount => Gate::Limit(UsageDimension::StaffAccounts),
            Self::AccessAnalytics => Gate::Feature(Feature::AnalyticsAccess),
            Self::PrioritySupport => Gate::Feature(Feature::PrioritySupport),
            Self::FeaturedListings => Gate::Feature(Feature::FeaturedListings),
            Self::CustomBranding => Gate::Feature(Feature::CustomBranding),
            Self::ApiAccess => Gate::Feature(Feature::ApiAccess),
        }
    }

    /// Whether the action needs `package_id` in its options.
    #[must_use]
    pub fn requires_package(&self) -> bool {
        matches!(self, Self::UploadPhotos)
    }
}

impl FromStr for Action {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| PolicyError::UnknownAction(s.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action-specific context for a check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOptions {
    /// Target package, required for `upload_photos`.
    #[serde(default, alias = "package_id")]
    pub package_id: Option<String>,
    /// Units about to be created (defaults to 1).
    #[serde(default)]
    pub quantity: Option<u64>,
}

impl ActionOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_package(package_id: impl Into<String>) -> Self {
        Self {
            package_id: Some(package_id.into()),
            quantity: None,
        }
    }

    #[must_use]
    pub fn with_quantity(mut self, quantity: u64) -> Self {
        self.quantity = Some(quantity);
        self
    }
}

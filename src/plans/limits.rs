//! Plan limits and usage dimensions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A cap on a usage dimension.
///
/// `Unlimited` sorts above every `Limited` value, so `a > b` reads as
/// "`a` allows more than `b`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawLimit", into = "RawLimit")]
pub enum Limit {
    Limited(u64),
    Unlimited,
}

impl Limit {
    /// Whether `additional` more units fit on top of `current`.
    ///
    /// This is a pre-condition check: creating one more record when
    /// `current == max` is rejected (`current + 1 > max`).
    #[must_use]
    pub fn admits(&self, current: u64, additional: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(max) => current.saturating_add(additional) <= *max,
        }
    }

    /// Whether `current` has reached `percent` of the cap (inclusive).
    ///
    /// Always `false` for `Unlimited`.
    #[must_use]
    pub fn reached_percent(&self, current: u64, percent: u8) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Limited(max) => {
                u128::from(current) * 100 >= u128::from(*max) * u128::from(percent)
            }
        }
    }

    /// Usage as a whole percentage of the cap (`None` when unlimited).
    #[must_use]
    pub fn percent_used(&self, current: u64) -> Option<u64> {
        match self {
            Self::Unlimited => None,
            Self::Limited(0) => Some(100),
            Self::Limited(max) => {
                let pct = u128::from(current) * 100 / u128::from(*max);
                Some(u64::try_from(pct).unwrap_or(u64::MAX))
            }
        }
    }

    /// Units left before the cap (`None` when unlimited).
    #[must_use]
    pub fn remaining(&self, current: u64) -> Option<u64> {
        match self {
            Self::Unlimited => None,
            Self::Limited(max) => Some(max.saturating_sub(current)),
        }
    }

    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// The numeric cap, if any.
    #[must_use]
    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Unlimited => None,
            Self::Limited(max) => Some(*max),
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => write!(f, "Unlimited"),
            Self::Limited(max) => write!(f, "{}", max),
        }
    }
}

/// Wire form of a limit: a number, or the string `"unlimited"`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawLimit {
    Count(u64),
    Text(String),
}

impl From<Limit> for RawLimit {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::Limited(max) => Self::Count(max),
            Limit::Unlimited => Self::Text("unlimited".to_string()),
        }
    }
}

impl TryFrom<RawLimit> for Limit {
    type Error = String;

    fn try_from(raw: RawLimit) -> Result<Self, Self::Error> {
        match raw {
            RawLimit::Count(max) => Ok(Self::Limited(max)),
            RawLimit::Text(s) if s.eq_ignore_ascii_case("unlimited") => Ok(Self::Unlimited),
            RawLimit::Text(s) => Err(format!(
                "invalid limit '{}': expected a non-negative integer or \"unlimited\"",
                s
            )),
        }
    }
}

/// A countable resource gated by a plan limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageDimension {
    Packages,
    BookingsPerMonth,
    PhotosPerPackage,
    CompanyDocuments,
    StaffAccounts,
}

impl UsageDimension {
    pub const ALL: [UsageDimension; 5] = [
        Self::Packages,
        Self::BookingsPerMonth,
        Self::PhotosPerPackage,
        Self::CompanyDocuments,
        Self::StaffAccounts,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Packages => "packages",
            Self::BookingsPerMonth => "bookings_per_month",
            Self::PhotosPerPackage => "photos_per_package",
            Self::CompanyDocuments => "company_documents",
            Self::StaffAccounts => "staff_accounts",
        }
    }

    /// Human-readable name used in warning and suggestion messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Packages => "packages",
            Self::BookingsPerMonth => "bookings this month",
            Self::PhotosPerPackage => "photos per package",
            Self::CompanyDocuments => "company documents",
            Self::StaffAccounts => "staff accounts",
        }
    }
}

impl fmt::Display for UsageDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resource limits for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub max_packages: Limit,
    pub max_bookings_per_month: Limit,
    pub max_photos_per_package: Limit,
    pub max_company_documents: Limit,
    pub max_staff_accounts: Limit,
}

impl PlanLimits {
    /// No caps on any dimension.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_packages: Limit::Unlimited,
            max_bookings_per_month: Limit::Unlimited,
            max_photos_per_package: Limit::Unlimited,
            max_company_documents: Limit::Unlimited,
            max_staff_accounts: Limit::Unlimited,
        }
    }

    #[must_use]
    pub fn get(&self, dimension: UsageDimension) -> Limit {
        match dimension {
            UsageDimension::Packages => self.max_packages,
            UsageDimension::BookingsPerMonth => self.max_bookings_per_month,
            UsageDimension::PhotosPerPackage => self.max_photos_per_package,
            UsageDimension::CompanyDocuments => self.max_company_documents,
            UsageDimension::StaffAccounts => self.max_staff_accounts,
        }
    }

    pub fn set(&mut self, dimension: UsageDimension, limit: Limit) {
        match dimension {
            UsageDimension::Packages => self.max_packages = limit,
            UsageDimension::BookingsPerMonth => self.max_bookings_per_month = limit,
            UsageDimension::PhotosPerPackage => self.max_photos_per_package = limit,
            UsageDimension::CompanyDocuments => self.max_company_documents = limit,
            UsageDimension::StaffAccounts => self.max_staff_accounts = limit,
        }
    }
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}

//! Usage counting contract.

use crate::error::Result;
use crate::plans::UsageDimension;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source of live usage counts for a company.
///
/// Implement this trait over the records that make up a company's usage
/// (packages, orders, photos, documents, staff). Every method must query the
/// source of truth; results must not be cached across calls.
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Number of active packages owned by the company.
    async fn count_active_packages(&self, company_id: &str) -> Result<u64>;

    /// Number of bookings (orders) for the company created at or after `since`.
    async fn count_bookings_since(&self, company_id: &str, since: DateTime<Utc>) -> Result<u64>;

    /// Number of photos attached to one package.
    ///
    /// Returns `None` when the package does not exist or belongs to another
    /// company.
    async fn count_package_photos(&self, company_id: &str, package_id: &str)
        -> Result<Option<u64>>;

    /// Largest photo count across the company's packages (0 with no packages).
    async fn max_photos_per_package(&self, company_id: &str) -> Result<u64>;

    /// Number of documents uploaded by the company.
    async fn count_documents(&self, company_id: &str) -> Result<u64>;

    /// Number of staff accounts attached to the company.
    async fn count_staff_accounts(&self, company_id: &str) -> Result<u64>;
}

/// Point-in-time usage for every dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub packages: u64,
    pub bookings_this_month: u64,
    pub max_photos_per_package: u64,
    pub documents: u64,
    pub staff_accounts: u64,
}

impl UsageSnapshot {
    /// Usage for a dimension.
    ///
    /// For [`UsageDimension::PhotosPerPackage`] this is the largest package,
    /// not a specific one.
    #[must_use]
    pub fn get(&self, dimension: UsageDimension) -> u64 {
        match dimension {
            UsageDimension::Packages => self.packages,
            UsageDimension::BookingsPerMonth => self.bookings_this_month,
            UsageDimension::PhotosPerPackage => self.max_photos_per_package,
            UsageDimension::CompanyDocuments => self.documents,
            UsageDimension::StaffAccounts => self.staff_accounts,
        }
    }
}

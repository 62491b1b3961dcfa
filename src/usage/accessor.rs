use super::source::{UsageSnapshot, UsageSource};
use crate::clock::SharedClock;
use crate::error::{PolicyError, Result};
use crate::plans::UsageDimension;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::sync::Arc;

/// First instant of the calendar month containing `now`, in UTC.
#[must_use]
pub fn current_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Live usage lookups for the policy engine.
///
/// Every call goes back to the [`UsageSource`]; nothing is memoized.
pub struct UsageAccessor<U: UsageSource> {
    source: Arc<U>,
    clock: SharedClock,
}

impl<U: UsageSource> Clone for UsageAccessor<U> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<U: UsageSource> UsageAccessor<U> {
    pub fn new(source: Arc<U>, clock: SharedClock) -> Self {
        Self { source, clock }
    }

    /// Access the underlying source.
    pub fn source(&self) -> &U {
        &self.source
    }

    /// Start of the booking window for "bookings this month".
    #[must_use]
    pub fn month_start(&self) -> DateTime<Utc> {
        current_month_start(self.clock.now())
    }

    /// Usage across every dimension, queried concurrently.
    pub async fn snapshot(&self, company_id: &str) -> Result<UsageSnapshot> {
        let since = self.month_start();
        let (packages, bookings_this_month, max_photos_per_package, documents, staff_accounts) =
            futures::try_join!(
                self.source.count_active_packages(company_id),
                self.source.count_bookings_since(company_id, since),
                self.source.max_photos_per_package(company_id),
                self.source.count_documents(company_id),
                self.source.count_staff_accounts(company_id),
            )?;

        Ok(UsageSnapshot {
            packages,
            bookings_this_month,
            max_photos_per_package,
            documents,
            staff_accounts,
        })
    }

    /// Company-wide usage for one dimension.
    ///
    /// Photos report the largest package; use [`package_photos`](Self::package_photos)
    /// for a specific package.
    pub async fn count(&self, company_id: &str, dimension: UsageDimension) -> Result<u64> {
        match dimension {
            UsageDimension::Packages => self.source.count_active_packages(company_id).await,
            UsageDimension::BookingsPerMonth => {
                self.source
                    .count_bookings_since(company_id, self.month_start())
                    .await
            }
            UsageDimension::PhotosPerPackage => self.source.max_photos_per_package(company_id).await,
            UsageDimension::CompanyDocuments => self.source.count_documents(company_id).await,
            UsageDimension::StaffAccounts => self.source.count_staff_accounts(company_id).await,
        }
    }

    /// Photos attached to one of the company's packages.
    pub async fn package_photos(&self, company_id: &str, package_id: &str) -> Result<u64> {
        self.source
            .count_package_photos(company_id, package_id)
            .await?
            .ok_or_else(|| PolicyError::PackageNotFound {
                company_id: company_id.to_string(),
                package_id: package_id.to_string(),
            })
    }
}

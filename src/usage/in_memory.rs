use super::source::UsageSource;
use crate::error::{PolicyError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

/// In-memory usage source for tests and local development.
///
/// Wraps data in Arc for cheap cloning; clones share the same records.
#[derive(Default, Clone)]
pub struct InMemoryUsageSource {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    companies: RwLock<HashMap<String, CompanyUsage>>,
    unavailable: AtomicBool,
}

#[derive(Default)]
struct CompanyUsage {
    packages: HashMap<String, PackageRecord>,
    bookings: Vec<DateTime<Utc>>,
    documents: u64,
    staff_accounts: u64,
}

struct PackageRecord {
    active: bool,
    photos: u64,
}

impl InMemoryUsageSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every query fail with [`PolicyError::StoreUnavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Add an active package with `photos` photos (replaces an existing id).
    pub fn add_package(&self, company_id: &str, package_id: &str, photos: u64) {
        self.update(company_id, |usage| {
            usage.packages.insert(
                package_id.to_string(),
                PackageRecord {
                    active: true,
                    photos,
                },
            );
        });
    }

    /// Seed `count` active packages with no photos.
    pub fn add_packages(&self, company_id: &str, count: u64) {
        self.update(company_id, |usage| {
            let start = usage.packages.len();
            for i in 0..count {
                usage.packages.insert(
                    format!("seed-{}", start as u64 + i),
                    PackageRecord {
                        active: true,
                        photos: 0,
                    },
                );
            }
        });
    }

    /// Mark a package active or archived. Archived packages do not count.
    pub fn set_package_active(&self, company_id: &str, package_id: &str, active: bool) {
        self.update(company_id, |usage| {
            if let Some(package) = usage.packages.get_mut(package_id) {
                package.active = active;
            }
        });
    }

    pub fn set_package_photos(&self, company_id: &str, package_id: &str, photos: u64) {
        self.update(company_id, |usage| {
            if let Some(package) = usage.packages.get_mut(package_id) {
                package.photos = photos;
            }
        });
    }

    pub fn add_booking(&self, company_id: &str, created_at: DateTime<Utc>) {
        self.update(company_id, |usage| usage.bookings.push(created_at));
    }

    /// Seed `count` bookings all created at `created_at`.
    pub fn add_bookings(&self, company_id: &str, count: u64, created_at: DateTime<Utc>) {
        self.update(company_id, |usage| {
            usage
                .bookings
                .extend(std::iter::repeat_n(created_at, count as usize));
        });
    }

    pub fn set_documents(&self, company_id: &str, count: u64) {
        self.update(company_id, |usage| usage.documents = count);
    }

    pub fn set_staff_accounts(&self, company_id: &str, count: u64) {
        self.update(company_id, |usage| usage.staff_accounts = count);
    }

    fn update(&self, company_id: &str, f: impl FnOnce(&mut CompanyUsage)) {
        let mut companies = match self.inner.companies.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(companies.entry(company_id.to_string()).or_default());
    }

    fn read(&self, operation: &str) -> Result<RwLockReadGuard<'_, HashMap<String, CompanyUsage>>> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(PolicyError::store(operation, "in-memory usage source marked unavailable"));
        }
        self.inner
            .companies
            .read()
            .map_err(|_| PolicyError::store(operation, "lock poisoned"))
    }
}

#[async_trait]
impl UsageSource for InMemoryUsageSource {
    async fn count_active_packages(&self, company_id: &str) -> Result<u64> {
        let companies = self.read("count_active_packages")?;
        Ok(companies
            .get(company_id)
            .map(|u| u.packages.values().filter(|p| p.active).count() as u64)
            .unwrap_or(0))
    }

    async fn count_bookings_since(&self, company_id: &str, since: DateTime<Utc>) -> Result<u64> {
        let companies = self.read("count_bookings_since")?;
        Ok(companies
            .get(company_id)
            .map(|u| u.bookings.iter().filter(|at| **at >= since).count() as u64)
            .unwrap_or(0))
    }

    async fn count_package_photos(
        &self,
        company_id: &str,
        package_id: &str,
    ) -> Result<Option<u64>> {
        let companies = self.read("count_package_photos")?;
        Ok(companies
            .get(company_id)
            .and_then(|u| u.packages.get(package_id))
            .map(|p| p.photos))
    }

    async fn max_photos_per_package(&self, company_id: &str) -> Result<u64> {
        let companies = self.read("max_photos_per_package")?;
        Ok(companies
            .get(company_id)
            .and_then(|u| u.packages.values().map(|p| p.photos).max())
            .unwrap_or(0))
    }

    async fn count_documents(&self, company_id: &str) -> Result<u64> {
        let companies = self.read("count_documents")?;
        Ok(companies.get(company_id).map(|u| u.documents).unwrap_or(0))
    }

    async fn count_staff_accounts(&self, company_id: &str) -> Result<u64> {
        let companies = self.read("count_staff_accounts")?;
        Ok(companies
            .get(company_id)
            .map(|u| u.staff_accounts)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_archived_packages_not_counted() {
        let source = InMemoryUsageSource::new();
        source.add_package("acme", "p1", 3);
        source.add_package("acme", "p2", 9);
        source.set_package_active("acme", "p2", false);

        assert_eq!(source.count_active_packages("acme").await.unwrap(), 1);
        assert_eq!(source.count_active_packages("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seed_helpers() {
        let source = InMemoryUsageSource::new();
        source.add_packages("acme", 9);
        source.add_package("acme", "extra", 0);
        assert_eq!(source.count_active_packages("acme").await.unwrap(), 10);

        let now = Utc::now();
        source.add_bookings("acme", 5, now);
        assert_eq!(source.count_bookings_since("acme", now).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_unavailable_switch() {
        let source = InMemoryUsageSource::new();
        source.set_unavailable(true);
        assert!(source.count_documents("acme").await.unwrap_err().is_transient());

        source.set_unavailable(false);
        assert_eq!(source.count_documents("acme").await.unwrap(), 0);
    }
}

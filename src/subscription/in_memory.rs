use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::storage::{Cancellation, PlanChange, Reconciliation, SubscriptionStore};
use super::types::{CompanySubscription, SubscriptionRecord, SubscriptionStatus};
use crate::error::{PolicyError, Result};

/// In-memory subscription store for tests and local development.
///
/// Projection and history live behind one lock, so every trait method is
/// atomic with respect to every other.
#[derive(Default, Clone)]
pub struct InMemorySubscriptionStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: RwLock<State>,
    unavailable: AtomicBool,
    writes_unavailable: AtomicBool,
    reconcile_writes: AtomicUsize,
}

#[derive(Default)]
struct State {
    companies: HashMap<String, CompanySubscription>,
    history: HashMap<String, Vec<SubscriptionRecord>>,
}

impl InMemorySubscriptionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a company projection.
    pub fn insert_company(&self, company: CompanySubscription) {
        let mut state = match self.inner.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.companies.insert(company.company_id.clone(), company);
    }

    /// Make every call fail with [`PolicyError::StoreUnavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make only writes fail; reads keep working.
    pub fn set_writes_unavailable(&self, unavailable: bool) {
        self.inner.writes_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `reconcile_projection` calls that wrote (for testing).
    #[must_use]
    pub fn reconcile_write_count(&self) -> usize {
        self.inner.reconcile_writes.load(Ordering::SeqCst)
    }

    fn read(&self, operation: &str) -> Result<RwLockReadGuard<'_, State>> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(PolicyError::store(operation, "in-memory store marked unavailable"));
        }
        self.inner
            .state
            .read()
            .map_err(|_| PolicyError::store(operation, "lock poisoned"))
    }

    fn write(&self, operation: &str) -> Result<RwLockWriteGuard<'_, State>> {
        if self.inner.unavailable.load(Ordering::SeqCst)
            || self.inner.writes_unavailable.load(Ordering::SeqCst)
        {
            return Err(PolicyError::store(operation, "in-memory store marked unavailable"));
        }
        self.inner
            .state
            .write()
            .map_err(|_| PolicyError::store(operation, "lock poisoned"))
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get_company(&self, company_id: &str) -> Result<Option<CompanySubscription>> {
        Ok(self.read("get_company")?.companies.get(company_id).cloned())
    }

    async fn save_company(&self, company: &CompanySubscription) -> Result<()> {
        self.write("save_company")?
            .companies
            .insert(company.company_id.clone(), company.clone());
        Ok(())
    }

    async fn reconcile_projection(&self, reconciliation: &Reconciliation) -> Result<bool> {
        let company_id = reconciliation.expected.company_id.as_str();
        let mut state = self.write("reconcile_projection")?;
        let company = state
            .companies
            .get_mut(company_id)
            .ok_or_else(|| PolicyError::company_not_found(company_id))?;
        if !reconciliation.still_matches(company) {
            return Ok(false);
        }
        company.status = reconciliation.status;
        company.features = reconciliation.features;
        self.inner.reconcile_writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn apply_plan_change(&self, change: &PlanChange) -> Result<Option<SubscriptionRecord>> {
        let mut state = self.write("apply_plan_change")?;
        let company_id = change.record.company_id.clone();

        let history = state.history.entry(company_id.clone()).or_default();
        let mut superseded = None;
        for record in history.iter_mut().filter(|r| r.is_active()) {
            record.cancel(
                &change.record.created_by,
                Some(&change.superseded_reason),
                change.record.created_at,
            );
            superseded = Some(record.clone());
        }
        history.push(change.record.clone());

        state.companies.insert(company_id, change.projection.clone());
        Ok(superseded)
    }

    async fn cancel_active(
        &self,
        cancellation: &Cancellation,
    ) -> Result<Option<SubscriptionRecord>> {
        let mut state = self.write("cancel_active")?;

        let cancelled = state
            .history
            .get_mut(&cancellation.company_id)
            .and_then(|history| history.iter_mut().find(|r| r.is_active()))
            .map(|record| {
                record.cancel(
                    &cancellation.actor_id,
                    cancellation.reason.as_deref(),
                    cancellation.at,
                );
                record.clone()
            });

        if cancelled.is_some() {
            if let Some(company) = state.companies.get_mut(&cancellation.company_id) {
                company.status = SubscriptionStatus::Cancelled;
            }
        }
        Ok(cancelled)
    }

    async fn get_active_record(&self, company_id: &str) -> Result<Option<SubscriptionRecord>> {
        Ok(self
            .read("get_active_record")?
            .history
            .get(company_id)
            .and_then(|h| h.iter().find(|r| r.is_active()).cloned()))
    }

    async fn list_history(&self, company_id: &str) -> Result<Vec<SubscriptionRecord>> {
        Ok(self
            .read("list_history")?
            .history
            .get(company_id)
            .cloned()
            .unwrap_or_default())
    }
}

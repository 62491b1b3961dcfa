//! Serialized check-and-create.
//!
//! [`PolicyEngine::check_action_allowed`] is a read followed by a decision, so
//! two concurrent requests can both see `limit - 1` and both create. The
//! [`CreationGate`] holds a per-company lock across the check and the caller's
//! insert, which closes that window for requests served by this process.
//! Multiple processes sharing a database still need the limit re-checked
//! inside the inserting transaction.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use super::action::{Action, ActionOptions};
use super::decision::Decision;
use super::engine::PolicyEngine;
use crate::error::Result;
use crate::subscription::SubscriptionStore;
use crate::usage::UsageSource;

/// Result of a gated creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// The check passed and `create` ran.
    Created(T),
    /// The check denied the action; `create` did not run.
    Denied(Decision),
}

impl<T> GateOutcome<T> {
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn created(self) -> Option<T> {
        match self {
            Self::Created(value) => Some(value),
            Self::Denied(_) => None,
        }
    }
}

/// Per-company locks for check-and-create.
#[derive(Debug, Default)]
pub struct CreationGate {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CreationGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `action` and, if allowed, run `create` while holding the
    /// company's lock.
    ///
    /// Errors from the check or from `create` are returned as-is.
    pub async fn check_and_create<S, U, F, Fut, T>(
        &self,
        engine: &PolicyEngine<S, U>,
        company_id: &str,
        action: Action,
        options: &ActionOptions,
        create: F,
    ) -> Result<GateOutcome<T>>
    where
        S: SubscriptionStore,
        U: UsageSource,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lock = self.acquire(company_id);
        let result = {
            let _guard = lock.lock().await;
            check_then_create(engine, company_id, action, options, create).await
        };
        self.release(company_id, lock);
        result
    }

    /// Number of companies with a lock entry (for testing).
    #[must_use]
    pub fn active_locks(&self) -> usize {
        self.map().len()
    }

    fn acquire(&self, company_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.map().entry(company_id.to_string()).or_default())
    }

    fn release(&self, company_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.map();
        // Only the map and this caller hold it: nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(company_id);
        }
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Check, then create only if allowed. No locking.
pub(crate) async fn check_then_create<S, U, F, Fut, T>(
    engine: &PolicyEngine<S, U>,
    company_id: &str,
    action: Action,
    options: &ActionOptions,
    create: F,
) -> Result<GateOutcome<T>>
where
    S: SubscriptionStore,
    U: UsageSource,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let decision = engine
        .check_action_allowed(company_id, action, options)
        .await?;
    if !decision.allowed {
        return Ok(GateOutcome::Denied(decision));
    }
    Ok(GateOutcome::Created(create().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SharedClock};
    use crate::config::PolicyConfig;
    use crate::plans::{PlanCatalog, PlanId};
    use crate::subscription::{
        CompanySubscription, InMemorySubscriptionStore, NoOpAuditLogger, StatusResolver,
    };
    use crate::usage::{InMemoryUsageSource, UsageAccessor};
    use chrono::Utc;

    fn engine(
        store: &InMemorySubscriptionStore,
        usage: &InMemoryUsageSource,
    ) -> PolicyEngine<InMemorySubscriptionStore, InMemoryUsageSource> {
        let clock: SharedClock = Arc::new(FixedClock::new(Utc::now()));
        let catalog = Arc::new(PlanCatalog::standard());
        let config = Arc::new(PolicyConfig::default());
        let accessor = UsageAccessor::new(Arc::new(usage.clone()), clock.clone());
        let resolver = StatusResolver::new(
            Arc::new(store.clone()),
            accessor.clone(),
            catalog.clone(),
            config.clone(),
            clock,
            Arc::new(NoOpAuditLogger),
        );
        PolicyEngine::new(resolver, accessor, catalog, config)
    }

    #[tokio::test]
    async fn test_concurrent_creates_never_exceed_limit() {
        let store = InMemorySubscriptionStore::new();
        let usage = InMemoryUsageSource::new();
        store.insert_company(CompanySubscription::free("acme"));
        let engine = Arc::new(engine(&store, &usage));
        let gate = Arc::new(CreationGate::new());

        let mut handles = Vec::new();
        for i in 0..10 {
            let engine = Arc::clone(&engine);
            let gate = Arc::clone(&gate);
            let usage = usage.clone();
            handles.push(tokio::spawn(async move {
                gate.check_and_create(
                    &engine,
                    "acme",
                    Action::CreatePackage,
                    &ActionOptions::new(),
                    || async move {
                        tokio::task::yield_now().await;
                        usage.add_package("acme", &format!("pkg-{}", i), 0);
                        Ok(i)
                    },
                )
                .await
            }));
        }

        let mut created = 0u64;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_created() {
                created += 1;
            }
        }

        let free = PlanCatalog::standard();
        let max = free.get(PlanId::Free).unwrap().limits.max_packages.value().unwrap();
        assert_eq!(created, max);
        assert_eq!(gate.active_locks(), 0);
    }

    #[tokio::test]
    async fn test_denied_skips_create() {
        let store = InMemorySubscriptionStore::new();
        let usage = InMemoryUsageSource::new();
        store.insert_company(CompanySubscription::free("acme"));
        usage.add_packages("acme", 3);
        let engine = engine(&store, &usage);
        let gate = CreationGate::new();

        let ran = std::sync::atomic::AtomicBool::new(false);
        let outcome = gate
            .check_and_create(&engine, "acme", Action::CreatePackage, &ActionOptions::new(), || async {
                ran.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        assert!(matches!(outcome, GateOutcome::Denied(_)));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_lock_released_on_error() {
        let store = InMemorySubscriptionStore::new();
        let usage = InMemoryUsageSource::new();
        let engine = engine(&store, &usage);
        let gate = CreationGate::new();

        let err = gate
            .check_and_create(&engine, "ghost", Action::CreatePackage, &ActionOptions::new(), || async {
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(gate.active_locks(), 0);
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};
use waymark::{
    Action, ActionOptions, BillingCycle, CompanySubscription, DenialReason, EnforcementMode,
    FixedClock, InMemorySubscriptionStore, InMemoryUsageSource, PlanCatalog, PlanId, PolicyConfig,
    PolicyError, SubscriptionPolicy, SubscriptionRecord, SubscriptionStatus, SubscriptionStore,
    UsageDimension,
};
use waymark::subscription::{
    Cancellation, NoOpAuditLogger, PlanChange, Reconciliation, WarningKind,
};

type Policy = SubscriptionPolicy<InMemorySubscriptionStore, InMemoryUsageSource>;

fn may_15() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 15, 12, 0, 0).unwrap()
}

struct Harness {
    store: InMemorySubscriptionStore,
    usage: InMemoryUsageSource,
    clock: FixedClock,
    policy: Policy,
}

fn harness_with(config: PolicyConfig) -> Harness {
    let store = InMemorySubscriptionStore::new();
    let usage = InMemoryUsageSource::new();
    let clock = FixedClock::new(may_15());
    let policy = SubscriptionPolicy::builder(store.clone(), usage.clone())
        .config(config)
        .clock(Arc::new(clock.clone()))
        .audit_logger(Arc::new(NoOpAuditLogger))
        .build();
    Harness {
        store,
        usage,
        clock,
        policy,
    }
}

fn harness() -> Harness {
    harness_with(PolicyConfig::default())
}

impl Harness {
    fn on_plan(&self, company_id: &str, plan_id: PlanId, end: Option<DateTime<Utc>>) {
        let catalog = PlanCatalog::standard();
        let plan = catalog.get(plan_id).unwrap();
        let start = may_15() - Duration::days(30);
        self.store
            .insert_company(CompanySubscription::active(company_id, plan, start, end));
    }

    async fn allowed(&self, company_id: &str, action: Action) -> bool {
        self.policy
            .check_action_allowed(company_id, action, &ActionOptions::new())
            .await
            .unwrap()
            .allowed
    }
}

#[tokio::test]
async fn test_unlimited_plan_never_denies_or_warns() {
    let h = harness();
    h.on_plan("globetrotters", PlanId::Enterprise, Some(may_15() + Duration::days(300)));
    h.usage.add_packages("globetrotters", 10_000);
    h.usage.add_bookings("globetrotters", 5_000, may_15());
    h.usage.set_documents("globetrotters", 999);
    h.usage.set_staff_accounts("globetrotters", 400);

    for action in Action::ALL {
        if action == Action::UploadPhotos {
            continue;
        }
        assert!(h.allowed("globetrotters", action).await, "{} denied", action);
    }

    let status = h.policy.get_subscription_status("globetrotters").await.unwrap();
    assert!(status.warnings.is_empty());

    let report = h.policy.validate_subscription_limits("globetrotters").await.unwrap();
    assert!(report.is_within_limits());

    let suggestions = h.policy.get_upgrade_suggestions("globetrotters").await.unwrap();
    assert!(suggestions.is_empty());
}

#[tokio::test]
async fn test_basic_plan_package_boundary() {
    let h = harness();
    h.on_plan("coastal", PlanId::Basic, Some(may_15() + Duration::days(20)));

    h.usage.add_packages("coastal", 9);
    let decision = h
        .policy
        .check_action_allowed("coastal", Action::CreatePackage, &ActionOptions::new())
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.current, Some(9));

    h.usage.add_packages("coastal", 1);
    let decision = h
        .policy
        .check_action_allowed("coastal", Action::CreatePackage, &ActionOptions::new())
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, Some(DenialReason::LimitReached));
    assert_eq!(decision.current, Some(10));
    assert_eq!(decision.upgrade_to, Some(PlanId::Professional));
    assert_eq!(decision.plan_name, "Basic");
}

#[tokio::test]
async fn test_quantity_is_checked_against_remaining() {
    let h = harness();
    h.on_plan("coastal", PlanId::Basic, None);
    h.usage.add_packages("coastal", 8);

    let two = ActionOptions::new().with_quantity(2);
    let three = ActionOptions::new().with_quantity(3);
    assert!(
        h.policy
            .check_action_allowed("coastal", Action::CreatePackage, &two)
            .await
            .unwrap()
            .allowed
    );
    assert!(
        !h.policy
            .check_action_allowed("coastal", Action::CreatePackage, &three)
            .await
            .unwrap()
            .allowed
    );
}

#[tokio::test]
async fn test_expired_subscription_denies_and_persists() {
    let h = harness();
    h.on_plan("lapsed", PlanId::Basic, Some(may_15() - Duration::days(1)));

    let decision = h
        .policy
        .check_action_allowed("lapsed", Action::CreatePackage, &ActionOptions::new())
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, Some(DenialReason::SubscriptionInactive));

    // Basic includes analytics, but an expired subscription still blocks it.
    let decision = h
        .policy
        .check_action_allowed("lapsed", Action::AccessAnalytics, &ActionOptions::new())
        .await
        .unwrap();
    assert_eq!(decision.reason, Some(DenialReason::SubscriptionInactive));

    let stored = h.store.get_company("lapsed").await.unwrap().unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Expired);

    let status = h.policy.get_subscription_status("lapsed").await.unwrap();
    assert_eq!(status.status, SubscriptionStatus::Expired);
    assert_eq!(status.warnings[0].kind, WarningKind::SubscriptionExpiry);
}

#[tokio::test]
async fn test_missing_feature_reports_upgrade() {
    let h = harness();
    h.store.insert_company(CompanySubscription::free("starter"));

    let decision = h
        .policy
        .check_action_allowed("starter", Action::AccessAnalytics, &ActionOptions::new())
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, Some(DenialReason::FeatureNotAvailable));
    assert_eq!(decision.upgrade_to, Some(PlanId::Basic));
}

#[tokio::test]
async fn test_batch_report_agrees_with_single_checks() {
    let h = harness();
    h.on_plan("coastal", PlanId::Basic, None);

    for count in 0..=12u64 {
        let report = h.policy.validate_subscription_limits("coastal").await.unwrap();
        let blocked = report.get(UsageDimension::Packages).unwrap().blocked;
        let allowed = h.allowed("coastal", Action::CreatePackage).await;
        assert_eq!(blocked, !allowed, "disagreement at {} packages", count);
        h.usage.add_packages("coastal", 1);
    }
}

#[tokio::test]
async fn test_warning_threshold_is_inclusive() {
    let h = harness();
    h.on_plan("coastal", PlanId::Basic, Some(may_15() + Duration::days(60)));

    h.usage.add_bookings("coastal", 79, may_15());
    let status = h.policy.get_subscription_status("coastal").await.unwrap();
    assert!(status.warnings.is_empty());

    h.usage.add_bookings("coastal", 1, may_15());
    let status = h.policy.get_subscription_status("coastal").await.unwrap();
    assert_eq!(status.warnings.len(), 1);
    assert_eq!(status.warnings[0].kind, WarningKind::BookingLimit);
    assert_eq!(status.warnings[0].message, "You have used 80 of 100 bookings this month");
}

#[tokio::test]
async fn test_last_month_bookings_do_not_count() {
    let h = harness();
    h.store.insert_company(CompanySubscription::free("starter"));
    h.usage
        .add_bookings("starter", 10, Utc.with_ymd_and_hms(2026, 4, 30, 23, 59, 59).unwrap());

    assert!(h.allowed("starter", Action::CreateBooking).await);
}

#[tokio::test]
async fn test_trial_lifecycle() {
    let h = harness();

    let company = h
        .policy
        .admin()
        .start_trial("newcomer", PlanId::Professional, "admin-1")
        .await
        .unwrap();
    assert_eq!(company.status, SubscriptionStatus::Trial);
    assert!(h.allowed("newcomer", Action::FeaturedListings).await);

    h.clock.advance(Duration::days(10));
    let status = h.policy.get_subscription_status("newcomer").await.unwrap();
    assert_eq!(status.status, SubscriptionStatus::Trial);
    assert_eq!(status.warnings[0].kind, WarningKind::SubscriptionExpiry);

    h.clock.advance(Duration::days(5));
    assert!(!h.allowed("newcomer", Action::CreatePackage).await);
    let status = h.policy.get_subscription_status("newcomer").await.unwrap();
    assert_eq!(status.status, SubscriptionStatus::Expired);

    let err = h
        .policy
        .admin()
        .start_trial("newcomer", PlanId::Basic, "admin-1")
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::InvalidPlanChange(_)));
}

#[tokio::test]
async fn test_admin_plan_changes_keep_one_active_record() {
    let h = harness();
    h.store.insert_company(CompanySubscription::free("growing"));
    let admin = h.policy.admin();

    admin
        .activate("growing", PlanId::Basic, BillingCycle::Monthly, "admin-1", None)
        .await
        .unwrap();
    admin
        .upgrade(
            "growing",
            PlanId::Professional,
            BillingCycle::Yearly,
            "admin-1",
            Some("annual deal".to_string()),
        )
        .await
        .unwrap();

    let err = admin
        .upgrade("growing", PlanId::Basic, BillingCycle::Monthly, "admin-1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::InvalidPlanChange(_)));

    admin
        .downgrade("growing", PlanId::Basic, BillingCycle::Monthly, "admin-2", None)
        .await
        .unwrap();

    let history = admin.history("growing").await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.iter().filter(|r| r.is_active()).count(), 1);
    assert_eq!(history[1].notes.as_deref(), Some("annual deal"));
    assert_eq!(history[1].billing_cycle, BillingCycle::Yearly);

    let status = h.policy.get_subscription_status("growing").await.unwrap();
    assert_eq!(status.plan.id, PlanId::Basic);
    assert_eq!(status.subscription_end_date, Some(Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()));
}

#[tokio::test]
async fn test_extend_and_cancel() {
    let h = harness();
    h.store.insert_company(CompanySubscription::free("seasonal"));
    let admin = h.policy.admin();

    admin
        .activate("seasonal", PlanId::Basic, BillingCycle::Monthly, "admin-1", None)
        .await
        .unwrap();
    let record = admin.extend("seasonal", 2, "admin-1").await.unwrap();
    assert_eq!(record.end_date, Some(Utc.with_ymd_and_hms(2026, 8, 15, 12, 0, 0).unwrap()));

    admin
        .cancel("seasonal", "admin-1", Some("closing for winter".to_string()))
        .await
        .unwrap();
    assert!(!h.allowed("seasonal", Action::CreatePackage).await);

    let err = admin.cancel("seasonal", "admin-1", None).await.unwrap_err();
    assert!(matches!(err, PolicyError::NoActiveSubscription { .. }));
}

#[tokio::test]
async fn test_suggestions_follow_usage() {
    let h = harness();
    h.on_plan("coastal", PlanId::Basic, None);
    h.usage.add_packages("coastal", 10);

    let suggestions = h.policy.get_upgrade_suggestions("coastal").await.unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].suggested_plan, PlanId::Professional);
    assert_eq!(suggestions[0].dimension, Some(UsageDimension::Packages));
}

#[tokio::test]
async fn test_serialized_creation_respects_limit() {
    let h = Arc::new(harness_with(
        PolicyConfig::builder()
            .with_enforcement(EnforcementMode::Serialized)
            .build()
            .unwrap(),
    ));
    h.store.insert_company(CompanySubscription::free("starter"));

    let mut handles = Vec::new();
    for i in 0..8 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            let usage = h.usage.clone();
            h.policy
                .check_and_create("starter", Action::CreatePackage, &ActionOptions::new(), || async move {
                    tokio::task::yield_now().await;
                    usage.add_package("starter", &format!("pkg-{}", i), 0);
                    Ok(())
                })
                .await
                .unwrap()
                .is_created()
        }));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap() {
            created += 1;
        }
    }
    assert_eq!(created, 3);
}

#[tokio::test]
async fn test_errors() {
    let h = harness();

    let err = h
        .policy
        .check_action_allowed("ghost", Action::CreatePackage, &ActionOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::CompanyNotFound { .. }));

    h.store.insert_company(CompanySubscription::free("starter"));
    let err = h
        .policy
        .check_action_named("starter", "teleport", &ActionOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::UnknownAction(_)));

    let err = h
        .policy
        .check_action_allowed("starter", Action::UploadPhotos, &ActionOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::MissingOption { .. }));

    h.usage.set_unavailable(true);
    let err = h
        .policy
        .check_action_allowed("starter", Action::CreatePackage, &ActionOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_plan_lookup() {
    let h = harness();
    assert!(h.policy.get_plan("gold").is_none());
    assert_eq!(h.policy.get_plan("professional").unwrap().price_cents, 7900);

    let yearly = h.policy.list_plans(BillingCycle::Yearly);
    assert_eq!(yearly.len(), 4);
    assert_eq!(yearly[1].price_cents, 2900 * 12 * 80 / 100);
}

/// Store whose first reconciliation is preceded by an admin renewal, as if
/// the admin request committed between the status read and its write-back.
struct RenewedMidResolve {
    inner: InMemorySubscriptionStore,
    renewer: Policy,
    renewed: AtomicBool,
}

#[async_trait::async_trait]
impl SubscriptionStore for RenewedMidResolve {
    async fn get_company(&self, company_id: &str) -> waymark::Result<Option<CompanySubscription>> {
        self.inner.get_company(company_id).await
    }

    async fn save_company(&self, company: &CompanySubscription) -> waymark::Result<()> {
        self.inner.save_company(company).await
    }

    async fn reconcile_projection(&self, reconciliation: &Reconciliation) -> waymark::Result<bool> {
        if !self.renewed.swap(true, Ordering::SeqCst) {
            self.renewer
                .admin()
                .activate(
                    &reconciliation.expected.company_id,
                    PlanId::Professional,
                    BillingCycle::Monthly,
                    "admin-1",
                    None,
                )
                .await?;
        }
        self.inner.reconcile_projection(reconciliation).await
    }

    async fn apply_plan_change(&self, change: &PlanChange) -> waymark::Result<Option<SubscriptionRecord>> {
        self.inner.apply_plan_change(change).await
    }

    async fn cancel_active(&self, cancellation: &Cancellation) -> waymark::Result<Option<SubscriptionRecord>> {
        self.inner.cancel_active(cancellation).await
    }

    async fn get_active_record(&self, company_id: &str) -> waymark::Result<Option<SubscriptionRecord>> {
        self.inner.get_active_record(company_id).await
    }

    async fn list_history(&self, company_id: &str) -> waymark::Result<Vec<SubscriptionRecord>> {
        self.inner.list_history(company_id).await
    }
}

#[tokio::test]
async fn test_renewal_during_status_read_is_kept() {
    let inner = InMemorySubscriptionStore::new();
    let usage = InMemoryUsageSource::new();
    let clock: waymark::SharedClock = Arc::new(FixedClock::new(may_15()));
    let catalog = PlanCatalog::standard();
    inner.insert_company(CompanySubscription::active(
        "acme",
        catalog.get(PlanId::Basic).unwrap(),
        may_15() - Duration::days(31),
        Some(may_15() - Duration::days(1)),
    ));

    let renewer = SubscriptionPolicy::builder(inner.clone(), usage.clone())
        .clock(clock.clone())
        .audit_logger(Arc::new(NoOpAuditLogger))
        .build();
    let store = RenewedMidResolve {
        inner: inner.clone(),
        renewer,
        renewed: AtomicBool::new(false),
    };
    let policy = SubscriptionPolicy::builder(store, usage)
        .clock(clock)
        .audit_logger(Arc::new(NoOpAuditLogger))
        .build();

    let status = policy.get_subscription_status("acme").await.unwrap();
    assert_eq!(status.status, SubscriptionStatus::Active);
    assert_eq!(status.plan.id, PlanId::Professional);

    let stored = inner.get_company("acme").await.unwrap().unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);
    assert_eq!(stored.plan_id, PlanId::Professional);
    assert_eq!(
        stored.subscription_end_date,
        Some(Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap())
    );

    let decision = policy
        .check_action_allowed("acme", Action::CreatePackage, &ActionOptions::new())
        .await
        .unwrap();
    assert!(decision.allowed);
}

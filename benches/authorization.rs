use std::sync::Arc;

use axum::http::Request;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tower::ServiceExt;
use waymark::{
    Action, ActionOptions, CompanySubscription, InMemorySubscriptionStore, InMemoryUsageSource,
    PlanCatalog, PlanId, SubscriptionPolicy,
};
use waymark::subscription::NoOpAuditLogger;

type Policy = SubscriptionPolicy<InMemorySubscriptionStore, InMemoryUsageSource>;

fn policy() -> Policy {
    let store = InMemorySubscriptionStore::new();
    let usage = InMemoryUsageSource::new();
    let catalog = PlanCatalog::standard();
    let basic = catalog.get(PlanId::Basic).unwrap();

    store.insert_company(CompanySubscription::free("free_co"));
    store.insert_company(CompanySubscription::active(
        "basic_co",
        basic,
        chrono::Utc::now(),
        None,
    ));
    usage.add_packages("basic_co", 7);
    usage.add_bookings("basic_co", 60, chrono::Utc::now());

    SubscriptionPolicy::builder(store, usage)
        .audit_logger(Arc::new(NoOpAuditLogger))
        .build()
}

fn benchmark_checks(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_action");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let policy = policy();
    let options = ActionOptions::new();

    group.bench_function("limit_gated", |b| {
        b.to_async(&rt).iter(|| async {
            policy
                .check_action_allowed(black_box("basic_co"), Action::CreatePackage, &options)
                .await
                .unwrap()
        });
    });

    group.bench_function("feature_gated", |b| {
        b.to_async(&rt).iter(|| async {
            policy
                .check_action_allowed(black_box("free_co"), Action::AccessAnalytics, &options)
                .await
                .unwrap()
        });
    });

    group.finish();
}

fn benchmark_reports(c: &mut Criterion) {
    let mut group = c.benchmark_group("reports");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let policy = policy();

    group.bench_function("subscription_status", |b| {
        b.to_async(&rt)
            .iter(|| async { policy.get_subscription_status(black_box("basic_co")).await.unwrap() });
    });

    group.bench_function("validate_limits", |b| {
        b.to_async(&rt).iter(|| async {
            policy
                .validate_subscription_limits(black_box("basic_co"))
                .await
                .unwrap()
        });
    });

    group.bench_function("upgrade_suggestions", |b| {
        b.to_async(&rt)
            .iter(|| async { policy.get_upgrade_suggestions(black_box("basic_co")).await.unwrap() });
    });

    group.finish();
}

fn benchmark_http(c: &mut Criterion) {
    let mut group = c.benchmark_group("http");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let router = waymark::http::routes(Arc::new(policy()));

    group.bench_function("check_route", |b| {
        b.to_async(&rt).iter(|| async {
            let req = Request::builder()
                .method("POST")
                .uri("/companies/basic_co/actions/create_package/check")
                .body(axum::body::Body::empty())
                .unwrap();
            router.clone().oneshot(req).await.unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_checks, benchmark_reports, benchmark_http);
criterion_main!(benches);

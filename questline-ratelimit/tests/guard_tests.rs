//! Admission control through the guard.

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use questline_ratelimit::{
    Admission, RateLimitError, RateLimitGuard, RateLimitPolicy, RateLimitResult, RateLimitStore,
    RateLimiter, RequestInfo, SkipReason, WindowState,
};
use questline_resilience::DegradationPolicy;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A store whose backend is always down.
#[derive(Default)]
struct FailingStore {
    calls: AtomicU64,
}

#[async_trait]
impl RateLimitStore for FailingStore {
    async fn consume(&self, _key: &str, _policy: &RateLimitPolicy) -> RateLimitResult<WindowState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RateLimitError::store("connection refused"))
    }

    async fn reset(&self, _key: &str) -> RateLimitResult<()> {
        Err(RateLimitError::store("connection refused"))
    }

    fn store_type(&self) -> &'static str {
        "failing"
    }
}

fn request(path: &str) -> RequestInfo {
    RequestInfo::new(path, "GET")
        .with_ip(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)))
        .with_user_agent("Mozilla/5.0 (X11; Linux x86_64)")
}

async fn guard(points: u64) -> RateLimitGuard {
    let limiter = RateLimiter::builder()
        .policy(RateLimitPolicy::new("global", points, Duration::from_secs(900)))
        .without_burst()
        .build()
        .await
        .unwrap();
    RateLimitGuard::new(Arc::new(limiter))
}

#[tokio::test(start_paused = true)]
async fn exactly_n_requests_pass_within_the_window() {
    let guard = guard(5).await;

    for _ in 0..5 {
        let admission = guard.admit(&request("/api/quests")).await.unwrap();
        assert!(matches!(admission, Admission::Allowed { .. }));
    }

    let err = guard.admit(&request("/api/quests")).await.unwrap_err();
    match &err {
        RateLimitError::LimitExceeded {
            actor,
            policy,
            limit,
            retry_after,
        } => {
            assert_eq!(actor, "ip:203.0.113.9");
            assert_eq!(policy, "global");
            assert_eq!(*limit, 5);
            assert_eq!(*retry_after, Duration::from_secs(900));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

    let mut headers = HeaderMap::new();
    err.headers().unwrap().apply_to(&mut headers);
    assert_eq!(headers["retry-after"], "900");

    tokio::time::advance(Duration::from_secs(900)).await;
    assert!(guard.admit(&request("/api/quests")).await.is_ok());
}

#[tokio::test]
async fn authenticated_users_are_limited_by_user_not_address() {
    let guard = guard(1).await;

    let alice = request("/api/feed").with_user_id("alice");
    let bob = request("/api/feed").with_user_id("bob");

    assert_eq!(
        guard.admit(&alice).await.unwrap().actor(),
        Some("user:alice")
    );
    assert!(guard.admit(&alice).await.is_err());
    assert!(guard.admit(&bob).await.is_ok());
}

#[tokio::test]
async fn store_outage_fails_open_by_default() {
    let store = Arc::new(FailingStore::default());
    let limiter = RateLimiter::builder()
        .store(store.clone())
        .build()
        .await
        .unwrap();
    let guard = RateLimitGuard::new(Arc::new(limiter));

    for _ in 0..3 {
        let admission = guard.admit(&request("/api/quests")).await.unwrap();
        assert!(admission.is_degraded());
    }
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    assert_eq!(guard.limiter().degraded_admissions(), 3);
    assert_eq!(guard.limiter().store_type(), "failing");
}

#[tokio::test]
async fn store_outage_rejects_when_failing_closed() {
    let limiter = RateLimiter::builder()
        .store(Arc::new(FailingStore::default()))
        .on_store_failure(DegradationPolicy::FailClosed)
        .build()
        .await
        .unwrap();
    let guard = RateLimitGuard::new(Arc::new(limiter));

    let err = guard.admit(&request("/api/quests")).await.unwrap_err();
    assert!(matches!(err, RateLimitError::ServiceUnavailable(_)));
    assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(guard.limiter().degraded_admissions(), 0);
}

#[tokio::test]
async fn bots_are_rejected_before_anything_else() {
    let store = Arc::new(FailingStore::default());
    let limiter = RateLimiter::builder()
        .store(store.clone())
        .enforce(false)
        .build()
        .await
        .unwrap();
    let guard = RateLimitGuard::new(Arc::new(limiter));

    let crawler = request("/api/auth/login").with_user_agent("Mozilla/5.0 (compatible; Bingbot/2.0)");
    let err = guard.admit(&crawler).await.unwrap_err();
    assert!(matches!(err, RateLimitError::BotRejected { .. }));
    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn exempt_and_unenforced_requests_skip_the_store() {
    let store = Arc::new(FailingStore::default());
    let limiter = RateLimiter::builder()
        .store(store.clone())
        .on_store_failure(DegradationPolicy::FailClosed)
        .build()
        .await
        .unwrap();
    let guard = RateLimitGuard::new(Arc::new(limiter));

    assert_eq!(
        guard.admit(&request("/api/auth/refresh")).await.unwrap(),
        Admission::Skipped(SkipReason::ExemptPath)
    );
    assert_eq!(
        guard.admit(&RequestInfo::new("/api/quests", "GET")).await.unwrap(),
        Admission::Skipped(SkipReason::NoActor)
    );

    let relaxed = RateLimitGuard::new(Arc::new(
        RateLimiter::builder()
            .store(store.clone())
            .enforce(false)
            .build()
            .await
            .unwrap(),
    ));
    assert_eq!(
        relaxed.admit(&request("/api/quests")).await.unwrap(),
        Admission::Skipped(SkipReason::NotEnforced)
    );
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn prefix_policies_select_the_longest_match() {
    let limiter = RateLimiter::builder()
        .route("/api", RateLimitPolicy::new("api", 10, Duration::from_secs(60)))
        .route(
            "/api/checkins",
            RateLimitPolicy::new("checkins", 1, Duration::from_secs(60))
                .with_block_duration(Duration::from_secs(600)),
        )
        .without_burst()
        .build()
        .await
        .unwrap();
    let guard = RateLimitGuard::new(Arc::new(limiter));

    assert!(guard.admit(&request("/api/checkins/park")).await.is_ok());
    let err = guard.admit(&request("/api/checkins/park")).await.unwrap_err();
    assert!(matches!(
        &err,
        RateLimitError::LimitExceeded { policy, .. } if policy == "checkins"
    ));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(600)));

    // The broader policy has its own counter
    match guard.admit(&request("/api/quests")).await.unwrap() {
        Admission::Allowed {
            policy, remaining, ..
        } => {
            assert_eq!(policy, "api");
            assert_eq!(remaining, 9);
        }
        other => panic!("unexpected admission: {other:?}"),
    }

    assert_eq!(
        guard.admit(&request("/health")).await.unwrap(),
        Admission::Skipped(SkipReason::NoPolicy)
    );
}

#[tokio::test(start_paused = true)]
async fn burst_rejections_do_not_consume_window_quota() {
    let limiter = RateLimiter::builder()
        .policy(RateLimitPolicy::new("global", 100, Duration::from_secs(900)))
        .burst(2, Duration::from_secs(1))
        .build()
        .await
        .unwrap();
    let guard = RateLimitGuard::new(Arc::new(limiter));

    guard.admit(&request("/api/feed")).await.unwrap();
    guard.admit(&request("/api/feed")).await.unwrap();
    for _ in 0..5 {
        let err = guard.admit(&request("/api/feed")).await.unwrap_err();
        assert!(matches!(
            &err,
            RateLimitError::LimitExceeded { policy, limit: 2, .. } if policy == "burst"
        ));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(1)));
    }

    tokio::time::advance(Duration::from_secs(1)).await;
    match guard.admit(&request("/api/feed")).await.unwrap() {
        Admission::Allowed { remaining, .. } => assert_eq!(remaining, 97),
        other => panic!("unexpected admission: {other:?}"),
    }
}

#[tokio::test]
async fn allowed_requests_expose_headers() {
    let guard = guard(100).await;
    let admission = guard.admit(&request("/api/quests")).await.unwrap();

    let mut headers = HeaderMap::new();
    admission.headers().unwrap().apply_to(&mut headers);
    assert_eq!(headers["x-ratelimit-limit"], "100");
    assert_eq!(headers["x-ratelimit-remaining"], "99");
    assert!(headers.get("retry-after").is_none());
}

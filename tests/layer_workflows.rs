//! Integration tests for the assembled resilience layer.
//!
//! These tests build the layer from settings the way a service does at
//! startup and exercise each dependency through it.

use http::StatusCode;
use questline::prelude::*;
use questline_cache::ConnectionState;
use std::net::{IpAddr, Ipv4Addr};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings_with_service(name: &str, url: &str) -> Settings {
    let mut settings = Settings::default();
    settings.retry.min_delay_ms = 5;
    settings.retry.max_delay_ms = 20;
    settings.retry.jitter = 0.0;
    settings.services.insert(name.to_string(), url.to_string());
    settings
}

// =============================================================================
// Outbound HTTP
// =============================================================================

#[tokio::test]
async fn service_calls_retry_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/quests/7"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/quests/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"id\":7}"))
        .expect(1)
        .mount(&server)
        .await;

    let layer = ResilienceLayer::from_settings(&settings_with_service("quests", &server.uri()))
        .await
        .unwrap();

    let response = layer
        .http
        .service("quests")
        .get("/v1/quests/7")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.target(), "service:quests");

    let health = layer.health();
    assert_eq!(health.breakers.get("service:quests"), Some(&CircuitState::Closed));
    assert!(health.is_healthy());
}

#[tokio::test]
async fn failing_service_opens_its_breaker_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(5)
        .mount(&server)
        .await;

    let mut settings = settings_with_service("feed", &server.uri());
    settings.retry.max_retries = 0;
    let layer = ResilienceLayer::from_settings(&settings).await.unwrap();

    for _ in 0..5 {
        let err = layer.http.service("feed").get("/v1/feed").send().await.unwrap_err();
        assert!(!err.is_circuit_open());
    }

    let err = layer.http.service("feed").get("/v1/feed").send().await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(err.suggested_status(), 503);

    let health = layer.health();
    assert_eq!(health.open_circuits(), vec!["service:feed"]);
    assert_eq!(health.breakers.get("cache:primary"), Some(&CircuitState::Closed));
    assert!(!health.is_healthy());
}

#[tokio::test]
async fn service_named_cache_has_its_own_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let layer = ResilienceLayer::from_settings(&settings_with_service("cache", &server.uri()))
        .await
        .unwrap();
    layer.cache.breaker().unwrap().force_open();

    let response = layer.http.service("cache").get("/ping").send().await.unwrap();
    assert!(response.is_success());

    let health = layer.health();
    assert_eq!(health.breakers.get("service:cache"), Some(&CircuitState::Closed));
    assert_eq!(health.breakers.get("cache:primary"), Some(&CircuitState::Open));
}

// =============================================================================
// Cache
// =============================================================================

#[tokio::test]
async fn cache_round_trips_through_memory_backend() {
    let layer = ResilienceLayer::from_settings(&Settings::default())
        .await
        .unwrap();

    layer.cache.set("leaderboard:weekly", &vec![3u32, 1, 2], 60).await;
    assert_eq!(
        layer.cache.get::<Vec<u32>>("leaderboard:weekly").await,
        Some(vec![3, 1, 2])
    );

    layer.cache.delete("leaderboard:weekly").await;
    assert_eq!(layer.cache.get::<Vec<u32>>("leaderboard:weekly").await, None);
}

#[cfg(feature = "redis")]
#[tokio::test]
async fn unreachable_cache_degrades_to_misses() {
    let mut settings = Settings::default();
    settings.cache.url = Some("redis://127.0.0.1:1".to_string());
    settings.cache.connect_attempts = 1;

    let layer = ResilienceLayer::from_settings(&settings).await.unwrap();

    layer.cache.set("profile:42", "explorer", 60).await;
    assert_eq!(layer.cache.get::<String>("profile:42").await, None);

    let health = layer.health();
    assert_eq!(health.cache.backend, "redis");
    assert_eq!(health.cache.connection, ConnectionState::Disconnected);
    assert!(!health.is_healthy());
}

// =============================================================================
// Inbound rate limiting
// =============================================================================

fn player(path: &str) -> RequestInfo {
    RequestInfo::new(path, "POST")
        .with_ip(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4)))
        .with_user_agent("QuestlineApp/3.2 (Android 14)")
}

#[tokio::test(start_paused = true)]
async fn production_enforces_the_configured_quota() {
    let mut settings = Settings::default();
    settings.environment = "production".to_string();
    settings.rate_limit.points = 3;
    settings.rate_limit.duration_secs = 60;

    let layer = ResilienceLayer::from_settings(&settings).await.unwrap();

    for _ in 0..3 {
        let admission = layer.rate_limit.admit(&player("/api/checkins")).await.unwrap();
        assert!(matches!(admission, Admission::Allowed { .. }));
    }

    let err = layer.rate_limit.admit(&player("/api/checkins")).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(60)));

    // Authentication stays reachable
    assert!(layer.rate_limit.admit(&player("/api/auth/login")).await.unwrap().is_skipped());

    let health = layer.health();
    assert!(health.rate_limit.enforced);
    assert_eq!(health.rate_limit.degraded_admissions, 0);
}

#[tokio::test]
async fn development_only_rejects_bots() {
    let layer = ResilienceLayer::from_settings(&Settings::default())
        .await
        .unwrap();

    let admission = layer.rate_limit.admit(&player("/api/checkins")).await.unwrap();
    assert!(admission.is_skipped());

    let scraper = player("/api/checkins").with_user_agent("python-scraper/1.0");
    let err = layer.rate_limit.admit(&scraper).await.unwrap_err();
    assert!(matches!(err, RateLimitError::BotRejected { .. }));
    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Settings
// =============================================================================

#[tokio::test]
async fn invalid_settings_are_rejected() {
    let mut settings = Settings::default();
    settings.breaker.failure_threshold = 0.0;

    let err = ResilienceLayer::from_settings(&settings).await.unwrap_err();
    assert!(matches!(err, LayerError::Config(ref e) if e.is_validation()));
}

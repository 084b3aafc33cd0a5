//! Assembly of the HTTP client, cache client and rate limit guard from
//! [`Settings`].

use crate::error::Result;
use crate::health::{HealthReport, RateLimitHealth};
use questline_cache::{CacheClient, CacheConfig, CacheStore, InMemoryCache};
use questline_config::{
    BreakerSettings, CacheSettings, FailureMode, RateLimitSettings, RetrySettings, Settings,
    SettingsLoader, Validate,
};
use questline_http_client::{HttpClient, HttpClientConfig, ServiceRegistry};
use questline_ratelimit::{GLOBAL_POLICY, RateLimitGuard, RateLimitPolicy, RateLimiter};
use questline_resilience::{
    CircuitBreakerConfig, DegradationPolicy, PipelineConfig, PipelineRegistry, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything a request handler needs to talk to its dependencies.
///
/// The HTTP client and the cache share one [`PipelineRegistry`], so
/// [`ResilienceLayer::health`] reports every breaker in one place.
///
/// ```rust,no_run
/// use questline::ResilienceLayer;
///
/// # async fn example() -> questline::Result<()> {
/// let layer = ResilienceLayer::from_env().await?;
/// let quests = layer.http.service("quests").get("/v1/quests/42").send().await;
/// println!("{:?}", layer.health());
/// # let _ = quests;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ResilienceLayer {
    pub http: HttpClient,
    pub cache: CacheClient,
    pub rate_limit: RateLimitGuard,
}

impl ResilienceLayer {
    /// Install logging, load settings from the environment and build the
    /// layer.
    pub async fn from_env() -> Result<Self> {
        questline_log::init();
        let settings = SettingsLoader::new().load()?;
        Self::from_settings(&settings).await
    }

    /// Build the layer from already loaded settings.
    ///
    /// Only invalid settings are an error. An unreachable cache or rate
    /// limit store degrades at runtime instead.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let pipeline = pipeline_config(&settings.breaker, &settings.retry);
        let http = HttpClient::new(http_config(settings, pipeline))?
            .with_services(service_registry(settings));

        let store = cache_store(&settings.cache).await?;
        let cache = CacheClient::with_registry(
            store,
            cache_config(&settings.cache, &settings.breaker),
            http.registry(),
        );

        let limiter = rate_limiter(&settings.rate_limit, settings.is_production()).await?;
        let limiter = Arc::new(limiter);
        limiter.spawn_cleanup();
        let rate_limit = RateLimitGuard::new(limiter);

        info!(
            environment = %settings.environment,
            services = settings.services.len(),
            cache = cache.health().backend,
            rate_limit_store = rate_limit.limiter().store_type(),
            enforced = rate_limit.limiter().config().enforce,
            "Resilience layer ready"
        );

        Ok(Self {
            http,
            cache,
            rate_limit,
        })
    }

    /// Registry holding every breaker created so far.
    pub fn registry(&self) -> &PipelineRegistry {
        self.http.registry()
    }

    pub fn health(&self) -> HealthReport {
        let limiter = self.rate_limit.limiter();
        HealthReport {
            breakers: self.registry().snapshot(),
            cache: self.cache.health(),
            rate_limit: RateLimitHealth {
                store: limiter.store_type(),
                enforced: limiter.config().enforce,
                degraded_admissions: limiter.degraded_admissions(),
            },
        }
    }
}

fn degradation(mode: FailureMode) -> DegradationPolicy {
    match mode {
        FailureMode::FailOpen => DegradationPolicy::FailOpen,
        FailureMode::FailClosed => DegradationPolicy::FailClosed,
    }
}

fn retry_policy(retry: &RetrySettings) -> RetryPolicy {
    RetryPolicy::new()
        .with_max_retries(retry.max_retries)
        .with_min_delay(Duration::from_millis(retry.min_delay_ms))
        .with_factor(retry.factor)
        .with_max_delay(Duration::from_millis(retry.max_delay_ms))
        .with_jitter(retry.jitter)
}

fn breaker_config(breaker: &BreakerSettings) -> CircuitBreakerConfig {
    CircuitBreakerConfig::default()
        .failure_rate_threshold(breaker.failure_threshold)
        .minimum_calls(breaker.minimum_calls)
        .reset_timeout(Duration::from_millis(breaker.reset_timeout_ms))
        .window(Duration::from_millis(breaker.window_ms), breaker.window_buckets)
        .half_open_max_calls(breaker.half_open_max_calls)
        .success_threshold(breaker.success_threshold)
}

fn pipeline_config(breaker: &BreakerSettings, retry: &RetrySettings) -> PipelineConfig {
    let config = PipelineConfig::default()
        .with_breaker(breaker_config(breaker))
        .with_retry(retry_policy(retry))
        .with_open_circuit(degradation(breaker.open_circuit));
    match breaker.call_timeout_ms {
        Some(ms) => config.with_call_timeout(Duration::from_millis(ms)),
        None => config,
    }
}

fn http_config(settings: &Settings, pipeline: PipelineConfig) -> HttpClientConfig {
    let mut builder = HttpClientConfig::builder()
        .timeout(Duration::from_millis(settings.http.timeout_ms))
        .pipeline(pipeline);
    if let Some(base_url) = &settings.http.base_url {
        builder = builder.base_url(base_url);
    }
    if let Some(user_agent) = &settings.http.user_agent {
        builder = builder.user_agent(user_agent);
    }
    builder.build()
}

fn service_registry(settings: &Settings) -> ServiceRegistry {
    settings
        .services
        .iter()
        .fold(ServiceRegistry::new(), |registry, (name, url)| {
            registry.register(name, url)
        })
}

fn cache_config(cache: &CacheSettings, breaker: &BreakerSettings) -> CacheConfig {
    let defaults = CacheConfig::default();
    let retry = defaults
        .pipeline
        .retry
        .clone()
        .with_max_retries(cache.max_retries);
    defaults
        .with_key_prefix(cache.key_prefix.as_str())
        .with_breaker(breaker_config(breaker))
        .with_retry(retry)
}

#[cfg(feature = "redis")]
async fn cache_store(cache: &CacheSettings) -> Result<Arc<dyn CacheStore>> {
    use questline_cache::{RedisCache, RedisConnectConfig};

    let Some(url) = &cache.url else {
        info!("No cache URL configured, using in-memory cache");
        return Ok(Arc::new(InMemoryCache::new()));
    };

    let defaults = RedisConnectConfig::new(url.as_str());
    let backoff = defaults
        .backoff
        .clone()
        .with_min_delay(Duration::from_millis(cache.connect_base_delay_ms));
    let redis = RedisCache::connect(
        defaults
            .with_connect_attempts(cache.connect_attempts)
            .with_backoff(backoff),
    )
    .await?;
    Ok(Arc::new(redis))
}

#[cfg(not(feature = "redis"))]
async fn cache_store(cache: &CacheSettings) -> Result<Arc<dyn CacheStore>> {
    if cache.url.is_some() {
        return Err(crate::LayerError::FeatureDisabled("redis"));
    }
    Ok(Arc::new(InMemoryCache::new()))
}

async fn rate_limiter(settings: &RateLimitSettings, production: bool) -> Result<RateLimiter> {
    let enforce = production || settings.enforce_in_non_production;
    if !enforce {
        warn!("Rate limiting is not enforced outside production, only bots are rejected");
    }

    let mut builder = RateLimiter::builder()
        .key_prefix(settings.key_prefix.as_str())
        .burst(
            u64::from(settings.burst_points),
            Duration::from_secs(settings.burst_duration_secs),
        )
        .on_store_failure(degradation(settings.on_store_failure))
        .exempt_prefixes(settings.exempt_prefixes.iter().cloned())
        .bot_patterns(settings.bot_patterns.iter().cloned())
        .enforce(enforce);

    if settings.routes.is_empty() {
        builder = builder.policy(
            RateLimitPolicy::new(
                GLOBAL_POLICY,
                u64::from(settings.points),
                Duration::from_secs(settings.duration_secs),
            )
            .with_block_duration(Duration::from_secs(settings.block_duration_secs)),
        );
    } else {
        for route in &settings.routes {
            builder = builder.route(
                route.prefix.as_str(),
                RateLimitPolicy::new(
                    route.name.as_str(),
                    u64::from(route.points),
                    Duration::from_secs(route.duration_secs),
                )
                .with_block_duration(Duration::from_secs(route.block_duration_secs)),
            );
        }
    }

    if let Some(url) = &settings.store_url {
        #[cfg(feature = "redis")]
        {
            builder = builder.redis_store(url);
        }
        #[cfg(not(feature = "redis"))]
        {
            let _ = url;
            return Err(crate::LayerError::FeatureDisabled("redis"));
        }
    }

    Ok(builder.build().await?)
}

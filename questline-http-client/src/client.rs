//! HTTP client implementation.

use bytes::Bytes;
use http::{HeaderMap, Method};
use questline_resilience::{CircuitState, Pipeline, PipelineRegistry, StateListener, TracingListener};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::request::{Address, ServiceRequests};
use crate::{
    HttpClientConfig, HttpClientError, HttpRequest, RequestBuilder, RequestError, Response,
    Result, ServiceRegistry, service_target,
};

/// HTTP client with a circuit breaker and retry policy per remote target.
///
/// Absolute URLs are keyed by origin (`scheme://host[:port]`), service calls
/// by `service:{name}`.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    config: Arc<HttpClientConfig>,
    registry: Arc<PipelineRegistry>,
    services: Arc<ServiceRegistry>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.config.base_url)
            .field("targets", &self.registry.targets())
            .field("services", &self.services.len())
            .finish()
    }
}

/// A request with its URL and pipeline resolved.
struct Dispatch {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Duration,
    pipeline: Arc<Pipeline>,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let registry = PipelineRegistry::new(config.pipeline.clone())
            .with_listener(Arc::new(TracingListener));
        Self::with_parts(config, ServiceRegistry::default(), registry)
    }

    /// Create a client from explicit parts.
    pub fn with_parts(
        config: HttpClientConfig,
        services: ServiceRegistry,
        registry: PipelineRegistry,
    ) -> Result<Self> {
        let redirect = match config.max_redirects {
            Some(max) => reqwest::redirect::Policy::limited(max),
            None => reqwest::redirect::Policy::none(),
        };
        let builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .gzip(config.compression)
            .brotli(config.compression)
            .redirect(redirect);

        let inner = builder
            .build()
            .map_err(|e| HttpClientError::RequestBuild(e.to_string()))?;

        Ok(Self {
            inner,
            config: Arc::new(config),
            registry: Arc::new(registry),
            services: Arc::new(services),
        })
    }

    /// Create a new HTTP client with default configuration.
    pub fn default_client() -> Result<Self> {
        Self::new(HttpClientConfig::default())
    }

    /// Replace the service registry.
    pub fn with_services(mut self, services: ServiceRegistry) -> Self {
        self.services = Arc::new(services);
        self
    }

    /// Add a breaker transition listener for targets created from now on.
    pub fn with_listener(self, listener: Arc<dyn StateListener>) -> Self {
        let registry = match Arc::try_unwrap(self.registry) {
            Ok(registry) => registry.with_listener(listener),
            Err(shared) => {
                // Shared with a clone; start a fresh registry so the clone
                // keeps its own pipelines untouched.
                let config = shared.config().clone();
                PipelineRegistry::new(config)
                    .with_listener(Arc::new(TracingListener))
                    .with_listener(listener)
            }
        };
        Self {
            registry: Arc::new(registry),
            ..self
        }
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Get the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Per-target pipelines.
    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Breaker state of every target seen so far.
    pub fn breaker_states(&self) -> BTreeMap<String, CircuitState> {
        self.registry.snapshot()
    }

    /// Create a GET request builder.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::GET, url)
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::POST, url)
    }

    /// Create a PUT request builder.
    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PUT, url)
    }

    /// Create a PATCH request builder.
    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PATCH, url)
    }

    /// Create a DELETE request builder.
    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::DELETE, url)
    }

    /// Create a HEAD request builder.
    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::HEAD, url)
    }

    /// Create a request builder with a custom method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, HttpRequest::to_url(method, url))
    }

    /// Builders for calls to a logical service.
    pub fn service(&self, name: impl Into<String>) -> ServiceRequests<'_> {
        ServiceRequests::new(self, name.into())
    }

    /// Execute a fully described request.
    pub async fn execute(&self, request: HttpRequest) -> Result<Response> {
        let dispatch = self.resolve(request)?;
        let pipeline = Arc::clone(&dispatch.pipeline);

        debug!(
            method = %dispatch.method,
            url = %dispatch.url,
            target_id = %pipeline.target(),
            "Sending request"
        );

        let response = pipeline
            .execute(|| self.attempt(&dispatch))
            .await
            .map_err(HttpClientError::from)?;

        debug!(
            status = response.status().as_u16(),
            target_id = %pipeline.target(),
            "Request completed"
        );
        Ok(response)
    }

    fn resolve(&self, request: HttpRequest) -> Result<Dispatch> {
        let (mut url, pipeline) = match &request.address {
            Address::Url(raw) => self.resolve_url(raw)?,
            Address::Service { name, path } => {
                let base = self
                    .services
                    .resolve(name)
                    .ok_or_else(|| HttpClientError::UnknownService(name.clone()))?;
                let url = Url::parse(&format!("{}{}", base, path))
                    .map_err(|e| HttpClientError::InvalidUrl(format!("{base}{path}: {e}")))?;
                (url, self.registry.pipeline(&service_target(name)))
            }
        };

        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(Dispatch {
            method: request.method,
            url,
            headers: request.headers,
            body: request.body,
            timeout: request.timeout.unwrap_or(self.config.timeout),
            pipeline,
        })
    }

    fn resolve_url(&self, raw: &str) -> Result<(Url, Arc<Pipeline>)> {
        if let Ok(url) = Url::parse(raw) {
            let origin = url.origin();
            if !origin.is_tuple() {
                return Err(HttpClientError::InvalidUrl(format!(
                    "{raw}: URL has no network origin"
                )));
            }
            let pipeline = self.registry.pipeline(&origin.ascii_serialization());
            return Ok((url, pipeline));
        }

        // Not absolute: join to the base URL and retry without a breaker.
        let base = self
            .config
            .base_url
            .as_deref()
            .ok_or_else(|| HttpClientError::InvalidUrl(format!("{raw}: relative URL without a base URL")))?;
        let url = Url::parse(base)
            .and_then(|base| base.join(raw))
            .map_err(|e| HttpClientError::InvalidUrl(format!("{raw}: {e}")))?;
        let pipeline = Pipeline::retry_only(url.as_str(), self.config.pipeline.retry.clone());
        Ok((url, Arc::new(pipeline)))
    }

    async fn attempt(&self, dispatch: &Dispatch) -> std::result::Result<Response, RequestError> {
        let mut request = self
            .inner
            .request(dispatch.method.clone(), dispatch.url.clone())
            .timeout(dispatch.timeout);

        for (name, value) in &self.config.default_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        for (name, value) in &dispatch.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &dispatch.body {
            request = request.body(body.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| RequestError::from_reqwest(e, dispatch.timeout))?;
        let response = Response::read(response, dispatch.pipeline.target())
            .await
            .map_err(|e| RequestError::from_reqwest(e, dispatch.timeout))?;

        if response.is_server_error() {
            debug!(
                status = response.status().as_u16(),
                url = %dispatch.url,
                "Server error response"
            );
            return Err(RequestError::ServerError(Box::new(response)));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_with_config() {
        let config = HttpClientConfig::builder()
            .timeout(Duration::from_secs(60))
            .base_url("https://api.example.com")
            .build();

        let client = HttpClient::new(config).unwrap();
        assert_eq!(client.config().timeout, Duration::from_secs(60));
        assert_eq!(
            client.config().base_url.as_deref(),
            Some("https://api.example.com")
        );
        assert!(client.breaker_states().is_empty());
    }

    #[test]
    fn test_absolute_urls_keyed_by_origin() {
        let client = HttpClient::default_client().unwrap();
        let first = client
            .resolve(HttpRequest::to_url(Method::GET, "https://svc.example/api/a?x=1"))
            .unwrap();
        let second = client
            .resolve(HttpRequest::to_url(Method::POST, "https://svc.example/other"))
            .unwrap();
        let other_port = client
            .resolve(HttpRequest::to_url(Method::GET, "https://svc.example:8443/api"))
            .unwrap();

        assert_eq!(first.pipeline.target(), "https://svc.example");
        assert!(Arc::ptr_eq(&first.pipeline, &second.pipeline));
        assert_eq!(other_port.pipeline.target(), "https://svc.example:8443");
        assert_eq!(client.registry().len(), 2);
    }

    #[test]
    fn test_relative_url_without_base_is_invalid() {
        let client = HttpClient::default_client().unwrap();
        let err = client
            .resolve(HttpRequest::to_url(Method::GET, "/api/users"))
            .err()
            .unwrap();
        assert!(matches!(err, HttpClientError::InvalidUrl(_)));
        assert!(client.registry().is_empty());
    }

    #[test]
    fn test_relative_url_joins_base_without_breaker() {
        let client = HttpClient::new(
            HttpClientConfig::builder()
                .base_url("https://api.example.com/v1/")
                .build(),
        )
        .unwrap();
        let dispatch = client
            .resolve(HttpRequest::to_url(Method::GET, "users/1"))
            .unwrap();

        assert_eq!(dispatch.url.as_str(), "https://api.example.com/v1/users/1");
        assert!(dispatch.pipeline.breaker().is_none());
        assert!(client.registry().is_empty());
    }

    #[test]
    fn test_service_resolution() {
        let client = HttpClient::default_client()
            .unwrap()
            .with_services(ServiceRegistry::new().register("profiles", "http://profiles:8080"));

        let mut request = HttpRequest::to_service(Method::GET, "profiles", "/users/7");
        request.query.push(("expand".into(), "friends".into()));
        let dispatch = client.resolve(request).unwrap();

        assert_eq!(dispatch.url.as_str(), "http://profiles:8080/users/7?expand=friends");
        assert_eq!(dispatch.pipeline.target(), "service:profiles");

        let err = client
            .resolve(HttpRequest::to_service(Method::GET, "billing", "/"))
            .err()
            .unwrap();
        assert!(matches!(err, HttpClientError::UnknownService(name) if name == "billing"));
    }
}

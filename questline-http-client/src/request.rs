//! Request description and fluent builder.

use crate::{HttpClient, HttpClientError, Response, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::time::Duration;

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// A URL. Absolute URLs are protected per origin; relative ones are
    /// joined to the configured base URL and only retried.
    Url(String),
    /// A logical service, resolved through the service registry.
    Service { name: String, path: String },
}

/// A complete outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub address: Address,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Per-attempt timeout; the client default applies when unset.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Request addressed by URL.
    pub fn to_url(method: Method, url: impl Into<String>) -> Self {
        Self::new(method, Address::Url(url.into()))
    }

    /// Request addressed by service name and path.
    pub fn to_service(method: Method, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(
            method,
            Address::Service {
                name: name.into(),
                path: path.into(),
            },
        )
    }

    fn new(method: Method, address: Address) -> Self {
        Self {
            method,
            address,
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }
}

/// HTTP request builder.
pub struct RequestBuilder<'a> {
    client: &'a HttpClient,
    request: HttpRequest,
    error: Option<HttpClientError>,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a HttpClient, request: HttpRequest) -> Self {
        Self {
            client,
            request,
            error: None,
        }
    }

    /// Add a header to the request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                self.request.headers.insert(name, value);
            }
            _ => self.fail(HttpClientError::RequestBuild(format!(
                "invalid header {name:?}"
            ))),
        }
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.request.headers.extend(headers);
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.query.push((key.into(), value.into()));
        self
    }

    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.request.query.push((k.into(), v.into()));
        }
        self
    }

    /// Set the request body as raw bytes.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = Some(body.into());
        self
    }

    /// Plain text body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.set_body("text/plain; charset=utf-8", text.into());
        self
    }

    /// JSON body. Serialization errors surface from [`send`](Self::send).
    pub fn json<T: Serialize + ?Sized>(mut self, json: &T) -> Self {
        match serde_json::to_vec(json) {
            Ok(bytes) => self.set_body("application/json", bytes),
            Err(e) => self.fail(HttpClientError::Json(e.to_string())),
        }
        self
    }

    /// URL-encoded form body.
    pub fn form<T: Serialize + ?Sized>(mut self, form: &T) -> Self {
        match serde_urlencoded::to_string(form) {
            Ok(encoded) => self.set_body("application/x-www-form-urlencoded", encoded),
            Err(e) => self.fail(HttpClientError::RequestBuild(e.to_string())),
        }
        self
    }

    /// Set a custom per-attempt timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout);
        self
    }

    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// HTTP basic credentials, base64 encoded.
    pub fn basic_auth(
        self,
        username: impl Into<String>,
        password: Option<impl Into<String>>,
    ) -> Self {
        use base64::Engine;
        let credentials = match password {
            Some(p) => format!("{}:{}", username.into(), p.into()),
            None => format!("{}:", username.into()),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        self.header("Authorization", format!("Basic {encoded}"))
    }

    /// The request as built so far.
    pub fn build(self) -> Result<HttpRequest> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.request),
        }
    }

    /// Send the request.
    pub async fn send(self) -> Result<Response> {
        let client = self.client;
        client.execute(self.build()?).await
    }

    fn set_body(&mut self, content_type: &'static str, body: impl Into<Bytes>) {
        self.request.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static(content_type),
        );
        self.request.body = Some(body.into());
    }

    fn fail(&mut self, error: HttpClientError) {
        tracing::error!(error = %error, "Invalid request");
        self.error.get_or_insert(error);
    }
}

/// Request builders for one logical service.
pub struct ServiceRequests<'a> {
    client: &'a HttpClient,
    name: String,
}

impl<'a> ServiceRequests<'a> {
    pub(crate) fn new(client: &'a HttpClient, name: String) -> Self {
        Self { client, name }
    }

    /// Service name used as the target identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, path: impl Into<String>) -> RequestBuilder<'a> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: impl Into<String>) -> RequestBuilder<'a> {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: impl Into<String>) -> RequestBuilder<'a> {
        self.request(Method::PUT, path)
    }

    pub fn patch(&self, path: impl Into<String>) -> RequestBuilder<'a> {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> RequestBuilder<'a> {
        self.request(Method::DELETE, path)
    }

    pub fn request(&self, method: Method, path: impl Into<String>) -> RequestBuilder<'a> {
        RequestBuilder::new(
            self.client,
            HttpRequest::to_service(method, self.name.clone(), path),
        )
    }
}

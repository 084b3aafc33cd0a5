//! Buffered responses.

use crate::{HttpClientError, Result};
use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use serde::de::DeserializeOwned;

/// A response read to completion, tagged with the target that served it.
///
/// Bodies are buffered so a failed attempt can be kept on the error after
/// the connection has been returned to the pool.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    url: url::Url,
    target: String,
}

impl Response {
    pub(crate) async fn read(
        response: reqwest::Response,
        target: &str,
    ) -> std::result::Result<Self, reqwest::Error> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        Ok(Self {
            status,
            headers,
            body,
            url,
            target: target.to_string(),
        })
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 4xx. Never retried and never counted against the breaker.
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// 5xx. Counted as a failed attempt.
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value, if present and valid UTF-8.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE)
    }

    /// Final URL, after redirects.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Breaker target the call was accounted under: an origin, a service
    /// name, or the full URL for base-relative calls.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Body decoded as UTF-8.
    pub fn text(&self) -> Result<String> {
        std::str::from_utf8(&self.body)
            .map(str::to_owned)
            .map_err(|e| HttpClientError::Json(format!("body is not UTF-8: {e}")))
    }

    /// Body decoded as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| HttpClientError::Json(e.to_string()))
    }
}

//! Key extraction for rate limiting
//!
//! This module decides which actor a request is counted against.

use http::{HeaderMap, Method, header::USER_AGENT};
use std::net::IpAddr;

/// Information about an incoming request used for admission control
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Client IP address
    pub ip: Option<IpAddr>,
    /// Request path
    pub path: String,
    /// Request method (GET, POST, etc.)
    pub method: String,
    /// User ID (if authenticated)
    pub user_id: Option<String>,
    /// User-Agent header
    pub user_agent: Option<String>,
    /// Headers that might be useful for key extraction
    pub headers: Vec<(String, String)>,
}

impl RequestInfo {
    /// Create a new request info
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            ip: None,
            path: path.into(),
            method: method.into(),
            user_id: None,
            user_agent: None,
            headers: Vec::new(),
        }
    }

    /// Build from HTTP request parts. Non-UTF-8 header values are skipped.
    pub fn from_parts(method: &Method, path: &str, headers: &HeaderMap) -> Self {
        let mut info = Self::new(path, method.as_str());
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                info.headers.push((name.as_str().to_string(), value.to_string()));
            }
        }
        info.user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        info
    }

    /// Set the IP address
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Set the user ID
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Get a header value by name (case-insensitive)
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// User agent from the dedicated field or the header list.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent
            .as_deref()
            .or_else(|| self.get_header("user-agent"))
    }
}

/// Key extraction strategies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyExtractor {
    /// Authenticated user if present, otherwise the client IP
    #[default]
    UserOrIp,
    /// Extract key from IP address
    Ip,
    /// Extract key from user ID (requires authentication)
    UserId,
    /// Extract key from a custom header
    Header {
        /// Header name to extract
        name: String,
    },
}

impl KeyExtractor {
    /// Create a header-based extractor
    pub fn header(name: impl Into<String>) -> Self {
        Self::Header { name: name.into() }
    }

    /// Extract the actor key from request info.
    ///
    /// Keys carry their kind (`user:`, `ip:`, `header:`) so a user id can
    /// never collide with an address.
    pub fn extract(&self, info: &RequestInfo) -> Option<String> {
        match self {
            Self::UserOrIp => Self::UserId
                .extract(info)
                .or_else(|| Self::Ip.extract(info)),
            Self::Ip => info.ip.map(|ip| format!("ip:{ip}")),
            Self::UserId => info
                .user_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .map(|id| format!("user:{id}")),
            Self::Header { name } => info
                .get_header(name)
                .filter(|v| !v.is_empty())
                .map(|v| format!("header:{v}")),
        }
    }

    /// Get a description of this extractor
    pub fn description(&self) -> &str {
        match self {
            Self::UserOrIp => "User ID or IP address",
            Self::Ip => "IP address",
            Self::UserId => "User ID",
            Self::Header { .. } => "Custom header",
        }
    }
}

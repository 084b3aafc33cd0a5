//! Logical service name to base URL mapping.

use std::collections::BTreeMap;

/// Breaker target identity for a named service.
///
/// Services live in their own key space, so a service name can never
/// collide with a URL origin or another kind of target in a shared registry.
pub fn service_target(name: &str) -> String {
    format!("service:{name}")
}

/// Static registry of known downstream services.
///
/// Base URLs are looked up at call time; the request URL is the base URL
/// followed by the request path.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, String>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a service.
    pub fn register(mut self, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.insert(name, base_url);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, base_url: impl Into<String>) {
        self.services.insert(name.into(), base_url.into());
    }

    /// Base URL for a service.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.services.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Registered service names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ServiceRegistry
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            services: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

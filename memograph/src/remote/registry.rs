//! The proxy registry.

use crate::remote::proxy::{RemoteError, RemoteProxy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Process-wide registry of remote proxies by name.
///
/// Lookups copy the handle out so the lock is never held across remote
/// calls.
#[derive(Clone)]
pub struct ProxyRegistry {
    proxies: Arc<Mutex<HashMap<String, Arc<dyn RemoteProxy>>>>,
}

static GLOBAL_PROXIES: OnceLock<ProxyRegistry> = OnceLock::new();

impl ProxyRegistry {
    pub fn new() -> Self {
        Self {
            proxies: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static ProxyRegistry {
        GLOBAL_PROXIES.get_or_init(ProxyRegistry::new)
    }

    /// Registers a proxy under its own name, replacing any previous one.
    pub fn register(&self, proxy: Arc<dyn RemoteProxy>) {
        self.proxies
            .lock()
            .unwrap()
            .insert(proxy.name().to_string(), proxy);
    }

    /// Finds a proxy by name.
    pub fn find(&self, name: &str) -> Result<Arc<dyn RemoteProxy>, RemoteError> {
        self.proxies
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::UnknownProxy(name.to_string()))
    }

    /// Registered proxy names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.proxies.lock().unwrap().keys().cloned().collect()
    }

    /// Drops every registration. Test fixtures only.
    pub fn reset_for_test(&self) {
        self.proxies.lock().unwrap().clear();
    }
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_proxy_error() {
        let registry = ProxyRegistry::new();
        assert!(matches!(
            registry.find("ghost"),
            Err(RemoteError::UnknownProxy(_))
        ));
    }
}

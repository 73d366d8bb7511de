//! Domains: named context factories.
//!
//! A remote submission carries a domain name; the server looks the domain
//! up here and asks it for a context suited to the request family. The
//! bundled [`TestingDomain`] builds plain local contexts and backs the test
//! suites and the CLI server.

use crate::context::core::{Context, ExecutionMode};
use crate::context::resources::Resources;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;

/// Errors from domain lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown domain '{0}'")]
    Unknown(String),
}

/// Constructs contexts for one request family.
pub trait Domain: Send + Sync {
    fn name(&self) -> &str;

    /// Builds a context over `resources` in the given mode.
    fn make_context(&self, resources: Arc<Resources>, mode: ExecutionMode) -> Context;
}

impl std::fmt::Debug for dyn Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Domain({})", self.name())
    }
}

/// Process-wide registry of domains by name.
#[derive(Clone)]
pub struct DomainRegistry {
    domains: Arc<Mutex<HashMap<String, Arc<dyn Domain>>>>,
}

static GLOBAL_DOMAINS: OnceLock<DomainRegistry> = OnceLock::new();

impl DomainRegistry {
    pub fn new() -> Self {
        Self {
            domains: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static DomainRegistry {
        GLOBAL_DOMAINS.get_or_init(DomainRegistry::new)
    }

    /// Registers a domain under its own name, replacing any previous one.
    pub fn register(&self, domain: Arc<dyn Domain>) {
        self.domains
            .lock()
            .unwrap()
            .insert(domain.name().to_string(), domain);
    }

    /// Finds a domain by name; the handle is copied out so the lock is not
    /// held across context construction.
    pub fn find(&self, name: &str) -> Result<Arc<dyn Domain>, DomainError> {
        self.domains
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::Unknown(name.to_string()))
    }

    /// Registered domain names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.domains.lock().unwrap().keys().cloned().collect()
    }

    /// Drops every registration. Test fixtures only.
    pub fn reset_for_test(&self) {
        self.domains.lock().unwrap().clear();
    }
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Domain producing plain local contexts; used by tests and the CLI server.
pub struct TestingDomain;

impl Domain for TestingDomain {
    fn name(&self) -> &str {
        "testing"
    }

    fn make_context(&self, resources: Arc<Resources>, mode: ExecutionMode) -> Context {
        Context::builder(resources).mode(mode).build()
    }
}

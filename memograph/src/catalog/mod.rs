//! The uuid → constructor catalog registry.
//!
//! Deserializing a request resolves its class uuid through a process-wide
//! registry. Registrations are scoped: a [`SeriCatalog`] owns everything it
//! registered and strips its entries when dropped, which is the lifecycle a
//! dynamically loaded module needs — register on load, unregister before the
//! code is unmapped. The registry keeps an ordered list per uuid and never
//! overwrites an entry in place, so a reloaded module's stale function
//! pointers are never reachable through a lookup.

mod registry;

pub use registry::{CatalogError, CatalogId, RequestConstructor, SeriRegistry};

use crate::request::{ErasedRequest, FunctionRequest, FunctionSpec};
use std::sync::Arc;

/// A scoped set of catalog registrations.
///
/// All entries registered through one `SeriCatalog` share its catalog id
/// and are unregistered together when it is dropped.
pub struct SeriCatalog {
    registry: SeriRegistry,
    cat_id: CatalogId,
    uuids: Vec<String>,
}

impl SeriCatalog {
    /// Creates a catalog registering into the process-wide registry.
    pub fn new() -> Self {
        Self::new_in(SeriRegistry::global())
    }

    /// Creates a catalog registering into a specific registry.
    pub fn new_in(registry: &SeriRegistry) -> Self {
        Self {
            registry: registry.clone(),
            cat_id: CatalogId::next(),
            uuids: Vec::new(),
        }
    }

    pub fn cat_id(&self) -> CatalogId {
        self.cat_id
    }

    /// The uuids this catalog has registered, in registration order.
    pub fn uuids(&self) -> &[String] {
        &self.uuids
    }

    /// Registers a raw constructor for `uuid`.
    ///
    /// Registering a uuid this catalog already registered is legal: the
    /// new entry is prepended and shadows the old one, and the registry
    /// emits a warning, since the leftover usually indicates a prior
    /// failed unregister. Dropping the catalog strips every entry either
    /// way.
    pub fn register(&mut self, uuid: &str, constructor: RequestConstructor) {
        self.registry.register(self.cat_id, uuid, constructor);
        if !self.uuids.iter().any(|u| u == uuid) {
            self.uuids.push(uuid.to_string());
        }
    }

    /// Registers a function spec under its declared uuid.
    pub fn register_function(&mut self, spec: Arc<FunctionSpec>) -> Result<(), CatalogError> {
        let uuid = match spec.uuid() {
            Some(uuid) if uuid.is_serializable() => uuid.as_str().to_string(),
            Some(uuid) => return Err(CatalogError::NotRegistrable(uuid.as_str().to_string())),
            None => return Err(CatalogError::NotRegistrable("<no uuid>".to_string())),
        };
        let constructor: RequestConstructor =
            Arc::new(move |args: Vec<ErasedRequest>| Ok(FunctionRequest::new(spec.clone(), args)));
        self.register(&uuid, constructor);
        Ok(())
    }

    /// Constructs a request by uuid through this catalog's registry.
    pub fn construct(
        &self,
        uuid: &str,
        args: Vec<ErasedRequest>,
    ) -> Result<ErasedRequest, CatalogError> {
        (self.registry.lookup(uuid)?)(args)
    }
}

impl Default for SeriCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SeriCatalog {
    fn drop(&mut self) {
        self.registry.unregister(self.cat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{CachingLevel, RequestUuid};
    use crate::value::{Value, ValueKind};

    fn double_spec(uuid: &str) -> Arc<FunctionSpec> {
        FunctionSpec::plain(ValueKind::Integer, |args: Vec<Value>| match &args[0] {
            Value::Integer(a) => Ok(Value::Integer(a * 2)),
            _ => Err(crate::resolve::ResolveError::Computation(
                "expected integer".into(),
            )),
        })
        .uuid(RequestUuid::new(uuid).unwrap())
        .caching(CachingLevel::Memory)
        .build()
        .unwrap()
    }

    #[test]
    fn test_register_and_construct() {
        let registry = SeriRegistry::new();
        let mut catalog = SeriCatalog::new_in(&registry);
        catalog.register_function(double_spec("cat/double@v1")).unwrap();

        let req = catalog
            .construct("cat/double@v1", vec![ErasedRequest::literal(5)])
            .unwrap();
        assert_eq!(req.uuid().unwrap().as_str(), "cat/double@v1");
        assert_eq!(catalog.uuids(), ["cat/double@v1".to_string()]);
    }

    #[test]
    fn test_duplicate_registration_layers_and_still_resolves() {
        let registry = SeriRegistry::new();
        let mut catalog = SeriCatalog::new_in(&registry);
        catalog.register_function(double_spec("cat/dup@v1")).unwrap();
        // Re-registering the same uuid is a leftover from a failed
        // unregister: it warns, prepends, and keeps working.
        catalog.register_function(double_spec("cat/dup@v1")).unwrap();

        assert_eq!(catalog.uuids(), ["cat/dup@v1".to_string()]);
        let req = catalog
            .construct("cat/dup@v1", vec![ErasedRequest::literal(5)])
            .unwrap();
        assert_eq!(req.uuid().unwrap().as_str(), "cat/dup@v1");

        // Dropping the catalog strips both layered entries.
        drop(catalog);
        assert!(matches!(
            registry.lookup("cat/dup@v1"),
            Err(CatalogError::UnregisteredUuid(_))
        ));
    }

    #[test]
    fn test_drop_unregisters_all_entries() {
        let registry = SeriRegistry::new();
        {
            let mut catalog = SeriCatalog::new_in(&registry);
            catalog.register_function(double_spec("cat/drop@v1")).unwrap();
            assert!(registry.lookup("cat/drop@v1").is_ok());
        }
        assert!(matches!(
            registry.lookup("cat/drop@v1"),
            Err(CatalogError::UnregisteredUuid(_))
        ));
    }

    #[test]
    fn test_layered_catalogs_shadow_then_restore() {
        let registry = SeriRegistry::new();
        let mut base = SeriCatalog::new_in(&registry);
        base.register_function(double_spec("cat/layered@v1")).unwrap();

        {
            let mut overlay = SeriCatalog::new_in(&registry);
            overlay
                .register_function(double_spec("cat/layered@v1"))
                .unwrap();
            // Most recent registration wins while the overlay is alive.
            assert!(registry.lookup("cat/layered@v1").is_ok());
        }

        // Overlay dropped; the base entry is found again.
        assert!(registry.lookup("cat/layered@v1").is_ok());
        drop(base);
        assert!(registry.lookup("cat/layered@v1").is_err());
    }

    #[test]
    fn test_memory_only_spec_is_not_registrable() {
        let registry = SeriRegistry::new();
        let mut catalog = SeriCatalog::new_in(&registry);
        let spec = FunctionSpec::plain(ValueKind::Nil, |_| Ok(Value::Nil))
            .uuid(RequestUuid::new("cat/local@v1").unwrap().memory_only())
            .build()
            .unwrap();
        assert!(matches!(
            catalog.register_function(spec),
            Err(CatalogError::NotRegistrable(_))
        ));
    }
}

//! Backend registry
//!
//! Maps every [`ResourceKind`] to the backend that manages it. Host crates
//! register their backends at startup; the planner looks them up per
//! resource.
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In the bastion-host crate
//! pub fn register(registry: &BackendRegistry, runner: Arc<dyn CommandRunner>) {
//!     registry.register(ResourceKind::Forwarding, Arc::new(SysctlBackend::new(runner)));
//! }
//! ```

use crate::error::{Error, Result};
use crate::resources::ResourceKind;
use crate::traits::ResourceBackend;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// Registry of resource backends
///
/// ## Thread Safety
///
/// Interior mutability with RwLock allows concurrent lookups and exclusive
/// registration.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<HashMap<ResourceKind, Arc<dyn ResourceBackend>>>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the backend for a resource kind, replacing any previous one
    pub fn register(&self, kind: ResourceKind, backend: Arc<dyn ResourceBackend>) {
        let mut backends = self.backends.write().unwrap_or_else(|e| e.into_inner());
        backends.insert(kind, backend);
    }

    /// Backend managing `kind`
    pub fn backend_for(&self, kind: ResourceKind) -> Result<Arc<dyn ResourceBackend>> {
        let backends = self.backends.read().unwrap_or_else(|e| e.into_inner());
        backends
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::config(format!("No backend registered for {}", kind)))
    }

    /// Check if a backend is registered for `kind`
    pub fn has_backend(&self, kind: ResourceKind) -> bool {
        let backends = self.backends.read().unwrap_or_else(|e| e.into_inner());
        backends.contains_key(&kind)
    }

    /// Registered kinds, in application order
    pub fn kinds(&self) -> Vec<ResourceKind> {
        ResourceKind::ORDER
            .into_iter()
            .filter(|kind| self.has_backend(*kind))
            .collect()
    }

    /// Union of the tools every registered backend needs
    pub fn required_tools(&self) -> BTreeSet<&'static str> {
        let backends = self.backends.read().unwrap_or_else(|e| e.into_inner());
        backends
            .values()
            .flat_map(|backend| backend.required_tools().iter().copied())
            .collect()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

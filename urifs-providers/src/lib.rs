//! Storage providers for URIFS
//!
//! Each provider contributes a [`BackendFactory`] that is registered under
//! the schemes it serves. The facade only ever looks factories up by
//! scheme name through [`FactoryRegistry`].

#[cfg(feature = "local")]
mod local;

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "local")]
pub use local::{LocalBackend, LocalFactory};

#[cfg(feature = "memory")]
pub use memory::{MemoryBackend, MemoryFactory, MemoryFile};

use std::collections::HashMap;
use std::sync::Arc;
use urifs_core::{BackendFactory, UrifsError, UrifsResult};

/// Registry of backend factories, keyed by scheme
#[derive(Clone)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Registry with every provider compiled into this build
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "local")]
        registry.register(Arc::new(LocalFactory));
        #[cfg(feature = "memory")]
        registry.register(Arc::new(MemoryFactory));
        registry
    }

    /// Register a factory under every scheme it reports. A later
    /// registration for the same scheme replaces the earlier one.
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        for scheme in factory.schemes() {
            self.register_scheme(*scheme, factory.clone());
        }
    }

    /// Register a factory under an extra scheme name (e.g., an alias)
    pub fn register_scheme(&mut self, scheme: impl AsRef<str>, factory: Arc<dyn BackendFactory>) {
        self.factories.insert(scheme.as_ref().to_ascii_lowercase(), factory);
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn BackendFactory>> {
        self.factories.get(scheme).cloned()
    }

    pub fn get_or_err(&self, scheme: &str) -> UrifsResult<Arc<dyn BackendFactory>> {
        self.get(scheme)
            .ok_or_else(|| UrifsError::UnsupportedScheme(scheme.to_string()))
    }

    /// Registered schemes, sorted
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        schemes.sort_unstable();
        schemes
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

//! Backend registry
//!
//! Maps a scheme (`file`, `memory`, `s3`) to the object store serving it.
//! Sources are resolved by their location's scheme; durable sinks by the
//! configured destination backend.

use super::error::{BackendError, BackendResult};
use super::{LocalBackend, MemoryBackend, ObjectStore};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RouterConfig;

/// Registry of object stores keyed by scheme
#[derive(Clone)]
pub struct BackendRegistry {
    stores: HashMap<String, Arc<dyn ObjectStore>>,
}

impl BackendRegistry {
    /// Create a registry with the local filesystem and a fresh in-memory store
    pub fn new() -> Self {
        let mut registry = Self {
            stores: HashMap::new(),
        };
        registry.register("file", Arc::new(LocalBackend::new()));
        registry.register("memory", Arc::new(MemoryBackend::new()));
        registry
    }

    /// Build the registry described by a router configuration
    ///
    /// The S3 store is only constructed when the `s3-native` feature is
    /// enabled; without it, `s3://` locations resolve to
    /// `BackendError::Unsupported`.
    pub async fn from_config(config: &RouterConfig) -> BackendResult<Self> {
        let mut registry = Self::new();

        if let Some(root) = &config.local_root {
            registry.register("file", Arc::new(LocalBackend::with_root(root)));
        }

        #[cfg(feature = "s3-native")]
        {
            let backend = super::S3Backend::new(&config.s3).await?;
            registry.register("s3", Arc::new(backend));
        }

        Ok(registry)
    }

    /// Register (or replace) the store serving `scheme`
    pub fn register(&mut self, scheme: impl Into<String>, store: Arc<dyn ObjectStore>) {
        self.stores.insert(scheme.into(), store);
    }

    /// Builder pattern: register a store
    pub fn with_store(mut self, scheme: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.register(scheme, store);
        self
    }

    /// Look up the store serving `scheme`
    pub fn get(&self, scheme: &str) -> BackendResult<Arc<dyn ObjectStore>> {
        self.stores
            .get(scheme)
            .cloned()
            .ok_or_else(|| BackendError::Unsupported {
                backend: scheme.to_string(),
                operation: "no backend registered (is the feature enabled?)".to_string(),
            })
    }

    /// Registered schemes, sorted
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.stores.keys().cloned().collect();
        schemes.sort();
        schemes
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

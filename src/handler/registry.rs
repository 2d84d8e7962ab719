//! Backend resolution by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{CacheClient, CacheHandler, FileHandler, HandlerOptions, MemoryHandler, StorageHandler};
use crate::error::SessionError;
use crate::Result;

type Factory = Box<dyn Fn(&HandlerOptions) -> Box<dyn StorageHandler> + Send + Sync>;

struct Registration {
    supported: fn() -> bool,
    factory: Factory,
}

/// Maps backend names to handler constructors.
///
/// The capability probe of a backend runs before its constructor, so a
/// backend whose dependency is missing is never partially built.
pub struct HandlerRegistry {
    backends: BTreeMap<String, Registration>,
}

impl HandlerRegistry {
    /// Create a registry with no backends.
    pub fn new() -> Self {
        Self {
            backends: BTreeMap::new(),
        }
    }

    /// Create a registry with the built-in `memory`, `file` and (when
    /// compiled in) `database` backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register::<MemoryHandler, _>("memory", |o| MemoryHandler::new(o.clone()));
        registry.register::<FileHandler, _>("file", |o| FileHandler::new(o.clone()));
        #[cfg(feature = "sqlite")]
        registry.register::<super::DatabaseHandler, _>("database", |o| {
            super::DatabaseHandler::new(o.clone())
        });
        registry
    }

    /// Register a backend under `name`, replacing any previous one.
    pub fn register<H, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        H: StorageHandler + 'static,
        F: Fn(&HandlerOptions) -> H + Send + Sync + 'static,
    {
        self.backends.insert(
            name.into(),
            Registration {
                supported: H::is_supported,
                factory: Box::new(move |options: &HandlerOptions| -> Box<dyn StorageHandler> {
                    Box::new(factory(options))
                }),
            },
        );
        self
    }

    /// Register the `cache` backend on top of a shared client.
    pub fn register_cache<C>(&mut self, client: C) -> &mut Self
    where
        C: CacheClient + 'static,
    {
        let client = Arc::new(client);
        self.register::<CacheHandler<Arc<C>>, _>("cache", move |o| {
            CacheHandler::new(Arc::clone(&client), o.clone())
        })
    }

    /// Check whether `name` is registered and its dependency available.
    pub fn is_available(&self, name: &str) -> bool {
        self.backends
            .get(name)
            .map_or(false, |reg| (reg.supported)())
    }

    /// List registered backends with their availability.
    pub fn available(&self) -> Vec<(String, bool)> {
        self.backends
            .iter()
            .map(|(name, reg)| (name.clone(), (reg.supported)()))
            .collect()
    }

    /// Build the handler for `name`.
    pub fn resolve(&self, name: &str, options: &HandlerOptions) -> Result<Box<dyn StorageHandler>> {
        let reg = self.backends.get(name).ok_or_else(|| {
            warn!(backend = name, "unknown storage backend");
            SessionError::BackendUnavailable(format!("unknown backend '{}'", name))
        })?;

        if !(reg.supported)() {
            warn!(backend = name, "storage backend not supported here");
            return Err(SessionError::BackendUnavailable(format!(
                "backend '{}' is not supported in this environment",
                name
            )));
        }

        debug!(backend = name, prefix = %options.prefix, ttl = options.ttl, "resolved storage backend");
        Ok((reg.factory)(options))
    }

    /// Build the handler for `name` behind a shareable pointer.
    pub fn resolve_shared(
        &self,
        name: &str,
        options: &HandlerOptions,
    ) -> Result<Arc<dyn StorageHandler>> {
        self.resolve(name, options).map(Arc::from)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

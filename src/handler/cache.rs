//! Distributed-cache backend.
//!
//! The handler talks to the cache through [`CacheClient`], a memcached-shaped
//! interface: values carry an absolute expiry and the cache evicts them on
//! its own, so garbage collection has nothing to do.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::{unix_now, HandlerOptions, StorageHandler};
use crate::error::SessionError;
use crate::Result;

/// Minimal client interface for a key-value cache with per-key expiry.
pub trait CacheClient: Send + Sync {
    /// Check whether the client library is usable in this environment.
    fn is_available() -> bool
    where
        Self: Sized,
    {
        true
    }

    /// Fetch a value, `None` on a miss.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value that expires at `expiration` (unix seconds, 0 = never).
    fn set(&self, key: &str, value: &[u8], expiration: u64) -> Result<()>;

    /// Delete a key. Returns whether the key existed.
    fn delete(&self, key: &str) -> Result<bool>;
}

impl<C: CacheClient> CacheClient for Arc<C> {
    fn is_available() -> bool {
        C::is_available()
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8], expiration: u64) -> Result<()> {
        (**self).set(key, value, expiration)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key)
    }
}

/// Storage handler on top of a [`CacheClient`].
#[derive(Debug)]
pub struct CacheHandler<C> {
    client: C,
    options: HandlerOptions,
}

impl<C: CacheClient> CacheHandler<C> {
    /// Create a handler using `client`.
    pub fn new(client: C, options: HandlerOptions) -> Self {
        Self { client, options }
    }

    /// The wrapped client.
    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: CacheClient> StorageHandler for CacheHandler<C> {
    fn is_supported() -> bool {
        C::is_available()
    }

    fn name(&self) -> &'static str {
        "cache"
    }

    fn open(&self, _save_path: &str, _session_name: &str) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Vec<u8>> {
        Ok(self
            .client
            .get(&self.options.key(id))?
            .unwrap_or_default())
    }

    fn write(&self, id: &str, data: &[u8]) -> Result<()> {
        let expiration = self.options.expires_at();
        self.client.set(&self.options.key(id), data, expiration)?;
        debug!(backend = "cache", id, expiration, "record written");
        Ok(())
    }

    fn destroy(&self, id: &str) -> Result<()> {
        self.client.delete(&self.options.key(id))?;
        Ok(())
    }

    fn gc(&self, _max_lifetime: u64) -> Result<usize> {
        // Expiry is enforced by the cache itself.
        Ok(0)
    }
}

/// In-process cache client with per-key expiry.
///
/// Useful for single-node deployments and tests; behaves like a memcached
/// server that never evicts for memory pressure.
#[derive(Debug, Default)]
pub struct LocalCache {
    entries: RwLock<HashMap<String, (Vec<u8>, u64)>>,
}

impl LocalCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Check whether the cache holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expiry timestamp stored for `key`.
    pub fn expiration(&self, key: &str) -> Option<u64> {
        self.entries
            .read()
            .ok()
            .and_then(|e| e.get(key).map(|(_, exp)| *exp))
    }
}

impl CacheClient for LocalCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| SessionError::LockPoisoned)?;

        let now = unix_now();
        Ok(entries
            .get(key)
            .filter(|(_, exp)| *exp == 0 || *exp > now)
            .map(|(value, _)| value.clone()))
    }

    fn set(&self, key: &str, value: &[u8], expiration: u64) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionError::LockPoisoned)?;

        // Sweep lazily, as a cache server would on memory reclaim.
        let now = unix_now();
        entries.retain(|_, (_, exp)| *exp == 0 || *exp > now);

        entries.insert(key.to_string(), (value.to_vec(), expiration));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionError::LockPoisoned)?;
        Ok(entries.remove(key).is_some())
    }
}

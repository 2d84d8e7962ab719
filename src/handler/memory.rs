//! In-process memory backend.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use super::{unix_now, HandlerOptions, StorageHandler};
use crate::error::SessionError;
use crate::Result;

/// A stored record with its timestamps (unix seconds).
#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    updated_at: u64,
    expires_at: u64,
}

impl Entry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// Thread-safe storage for session records inside the current process.
#[derive(Debug)]
pub struct MemoryHandler {
    records: RwLock<HashMap<String, Entry>>,
    options: HandlerOptions,
}

impl MemoryHandler {
    /// Create an empty memory handler.
    pub fn new(options: HandlerOptions) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            options,
        }
    }

    /// Options this handler was created with.
    pub fn options(&self) -> &HandlerOptions {
        &self.options
    }

    /// Number of records held, expired ones included.
    pub fn count(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Expiry timestamp of the record for `id`, if present.
    pub fn expires_at(&self, id: &str) -> Result<Option<u64>> {
        let records = self
            .records
            .read()
            .map_err(|_| SessionError::LockPoisoned)?;
        Ok(records.get(&self.options.key(id)).map(|e| e.expires_at))
    }
}

impl Default for MemoryHandler {
    fn default() -> Self {
        Self::new(HandlerOptions::default())
    }
}

impl StorageHandler for MemoryHandler {
    fn is_supported() -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&self, _save_path: &str, _session_name: &str) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Vec<u8>> {
        let records = self
            .records
            .read()
            .map_err(|_| SessionError::LockPoisoned)?;

        let now = unix_now();
        Ok(records
            .get(&self.options.key(id))
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.data.clone())
            .unwrap_or_default())
    }

    fn write(&self, id: &str, data: &[u8]) -> Result<()> {
        let entry = Entry {
            data: data.to_vec(),
            updated_at: unix_now(),
            expires_at: self.options.expires_at(),
        };

        let mut records = self
            .records
            .write()
            .map_err(|_| SessionError::LockPoisoned)?;

        records.insert(self.options.key(id), entry);
        debug!(backend = "memory", id, len = data.len(), "record written");
        Ok(())
    }

    fn destroy(&self, id: &str) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| SessionError::LockPoisoned)?;
        records.remove(&self.options.key(id));
        Ok(())
    }

    fn gc(&self, max_lifetime: u64) -> Result<usize> {
        let now = unix_now();
        let cutoff = now.saturating_sub(max_lifetime);

        let mut records = self
            .records
            .write()
            .map_err(|_| SessionError::LockPoisoned)?;

        let before = records.len();
        records.retain(|_, entry| !entry.is_expired(now) && entry.updated_at >= cutoff);
        Ok(before - records.len())
    }
}

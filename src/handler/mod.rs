//! Storage handlers.
//!
//! A storage handler persists the encoded record of each session in one
//! storage medium. Every backend implements the same [`StorageHandler`]
//! contract, so the session controller never knows where its data lives.
//!
//! ## Backends
//!
//! - **memory**: process-local map, lost on exit
//! - **cache**: any memcached-shaped [`CacheClient`] with native key expiry
//! - **file**: one file per session in a directory
//! - **database**: SQLite table (feature `sqlite`)
//!
//! ## Example
//!
//! ```rust
//! use session_vault::handler::{HandlerOptions, HandlerRegistry};
//!
//! let registry = HandlerRegistry::with_defaults();
//! let handler = registry.resolve("memory", &HandlerOptions::default()).unwrap();
//!
//! handler.write("abc", b"payload").unwrap();
//! assert_eq!(handler.read("abc").unwrap(), b"payload");
//! ```

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::Result;

pub mod cache;
#[cfg(feature = "sqlite")]
pub mod database;
pub mod file;
pub mod memory;
pub mod registry;

pub use cache::{CacheClient, CacheHandler, LocalCache};
#[cfg(feature = "sqlite")]
pub use database::DatabaseHandler;
pub use file::FileHandler;
pub use memory::MemoryHandler;
pub use registry::HandlerRegistry;

/// Contract every storage backend satisfies.
///
/// Absence is never an error: reading an unknown identifier yields an
/// empty blob and destroying one succeeds. This includes identifiers the
/// backend could never store, such as ones outside `[A-Za-z0-9,-]` for the
/// file backend; only `write` rejects those, with
/// [`crate::SessionError::InvalidSessionId`]. Everything else the backend
/// cannot do is reported as [`crate::SessionError::BackendFailure`].
pub trait StorageHandler: Send + Sync {
    /// Check whether the backend's client library is usable here.
    fn is_supported() -> bool
    where
        Self: Sized;

    /// Backend name, as used in logs and by the registry.
    fn name(&self) -> &'static str;

    /// Prepare the backend. Idempotent.
    fn open(&self, save_path: &str, session_name: &str) -> Result<()>;

    /// Release backend resources. Safe to call more than once.
    fn close(&self) -> Result<()>;

    /// Read the raw record for `id`, or an empty blob if absent or expired.
    fn read(&self, id: &str) -> Result<Vec<u8>>;

    /// Upsert the record for `id` and push its expiry to now + ttl.
    fn write(&self, id: &str, data: &[u8]) -> Result<()>;

    /// Delete the record for `id`.
    fn destroy(&self, id: &str) -> Result<()>;

    /// Remove records older than `max_lifetime` seconds.
    ///
    /// Returns the number of records removed.
    fn gc(&self, max_lifetime: u64) -> Result<usize>;
}

/// Options shared by all backends.
///
/// Unknown keys in a serialized options object are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerOptions {
    /// Prefix applied to every backend key.
    pub prefix: String,
    /// Seconds until a written record expires.
    pub ttl: u64,
    /// Location for file or database backends.
    pub path: Option<PathBuf>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            prefix: "vault_".to_string(),
            ttl: 1440,
            path: None,
        }
    }
}

impl HandlerOptions {
    /// Options with the given prefix and ttl.
    pub fn new(prefix: impl Into<String>, ttl: u64) -> Self {
        Self {
            prefix: prefix.into(),
            ttl,
            path: None,
        }
    }

    /// Set the backend location.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Backend key for a session identifier.
    pub fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Expiry timestamp for a record written now.
    pub fn expires_at(&self) -> u64 {
        unix_now().saturating_add(self.ttl)
    }
}

/// Current time as unix seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

//! Filesystem backend: one file per session.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use super::{HandlerOptions, StorageHandler};
use crate::error::SessionError;
use crate::session::SessionId;
use crate::Result;

/// Stores each record as `<dir>/<prefix><id>`.
///
/// A record's age is its file modification time, so every write refreshes
/// the expiry. Writes go through a temporary file and a rename, so readers
/// never observe a half-written record.
#[derive(Debug)]
pub struct FileHandler {
    dir: RwLock<PathBuf>,
    options: HandlerOptions,
}

impl FileHandler {
    /// Create a handler rooted at `options.path`, or the system temp dir.
    pub fn new(options: HandlerOptions) -> Self {
        let dir = options
            .path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("session-vault"));
        Self {
            dir: RwLock::new(dir),
            options,
        }
    }

    /// Directory currently holding the records.
    pub fn dir(&self) -> Result<PathBuf> {
        self.dir
            .read()
            .map(|d| d.clone())
            .map_err(|_| SessionError::LockPoisoned)
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        if !SessionId::is_valid(id) {
            return Err(SessionError::InvalidSessionId(id.into()));
        }
        Ok(self.dir()?.join(self.options.key(id)))
    }

    fn is_expired(&self, modified: SystemTime) -> bool {
        let ttl = Duration::from_secs(self.options.ttl);
        modified
            .checked_add(ttl)
            .map_or(false, |expires| expires <= SystemTime::now())
    }

    fn ensure_dir(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| {
            SessionError::BackendFailure(format!("cannot create {}: {}", dir.display(), e))
        })
    }
}

impl Default for FileHandler {
    fn default() -> Self {
        Self::new(HandlerOptions::default())
    }
}

impl StorageHandler for FileHandler {
    fn is_supported() -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "file"
    }

    fn open(&self, save_path: &str, _session_name: &str) -> Result<()> {
        if !save_path.is_empty() {
            let mut dir = self.dir.write().map_err(|_| SessionError::LockPoisoned)?;
            *dir = PathBuf::from(save_path);
        }
        Self::ensure_dir(&self.dir()?)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Vec<u8>> {
        // Such an id can never have been written here.
        if !SessionId::is_valid(id) {
            return Ok(Vec::new());
        }
        let path = self.record_path(id)?;

        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if self.is_expired(metadata.modified()?) {
            debug!(backend = "file", id, "record expired");
            return Ok(Vec::new());
        }

        match fs::read(&path) {
            Ok(data) => Ok(data),
            // Removed by gc between the stat and the read.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, id: &str, data: &[u8]) -> Result<()> {
        let path = self.record_path(id)?;
        let dir = self.dir()?;
        Self::ensure_dir(&dir)?;

        let tmp = dir.join(format!(
            ".{}.{:08x}.tmp",
            self.options.key(id),
            rand::random::<u32>()
        ));
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(backend = "file", id, len = data.len(), "record written");
        Ok(())
    }

    fn destroy(&self, id: &str) -> Result<()> {
        if !SessionId::is_valid(id) {
            return Ok(());
        }
        let path = self.record_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn gc(&self, max_lifetime: u64) -> Result<usize> {
        let dir = self.dir()?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(max_lifetime))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&self.options.prefix) {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if modified >= cutoff {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(backend = "file", file = name, error = %e, "gc could not remove record"),
            }
        }

        Ok(removed)
    }
}

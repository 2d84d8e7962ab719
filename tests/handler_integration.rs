//! Storage handler contract tests.
//!
//! Every backend must behave the same way through the `StorageHandler`
//! interface, so the same checks run against each of them.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use session_vault::{
    CacheClient, CacheHandler, FileHandler, HandlerOptions, HandlerRegistry, LocalCache,
    MemoryHandler, Result, SessionError, StorageHandler,
};
use tempfile::TempDir;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn options() -> HandlerOptions {
    HandlerOptions::new("jfwtest_", 1000)
}

/// Builds one handler of every built-in kind.
fn all_handlers(dir: &TempDir) -> Vec<Box<dyn StorageHandler>> {
    let mut handlers: Vec<Box<dyn StorageHandler>> = vec![
        Box::new(MemoryHandler::new(options())),
        Box::new(CacheHandler::new(LocalCache::new(), options())),
        Box::new(FileHandler::new(options().with_path(dir.path().join("files")))),
    ];
    #[cfg(feature = "sqlite")]
    handlers.push(Box::new(session_vault::DatabaseHandler::new(
        options().with_path(dir.path().join("sessions.db")),
    )));
    handlers
}

// ============================================================================
// Contract
// ============================================================================

#[test]
fn test_open_and_close_are_idempotent() {
    let dir = TempDir::new().unwrap();
    for handler in all_handlers(&dir) {
        assert!(handler.open("", "bar").is_ok(), "{}", handler.name());
        assert!(handler.open("", "bar").is_ok(), "{}", handler.name());
        assert!(handler.close().is_ok(), "{}", handler.name());
        assert!(handler.close().is_ok(), "{}", handler.name());
    }
}

#[test]
fn test_read_unknown_id_is_empty() {
    let dir = TempDir::new().unwrap();
    for handler in all_handlers(&dir) {
        let data = handler.read("neverwritten").unwrap();
        assert!(data.is_empty(), "{}", handler.name());
    }
}

#[test]
fn test_write_then_read() {
    let dir = TempDir::new().unwrap();
    for handler in all_handlers(&dir) {
        assert!(handler.write("abc", b"payload").is_ok(), "{}", handler.name());
        assert_eq!(handler.read("abc").unwrap(), b"payload", "{}", handler.name());

        handler.write("abc", b"replaced").unwrap();
        assert_eq!(handler.read("abc").unwrap(), b"replaced", "{}", handler.name());
    }
}

#[test]
fn test_records_are_isolated_by_id() {
    let dir = TempDir::new().unwrap();
    for handler in all_handlers(&dir) {
        handler.write("one", b"1").unwrap();
        handler.write("two", b"2").unwrap();
        handler.destroy("one").unwrap();

        assert!(handler.read("one").unwrap().is_empty(), "{}", handler.name());
        assert_eq!(handler.read("two").unwrap(), b"2", "{}", handler.name());
    }
}

#[test]
fn test_unstorable_id_reads_as_absent() {
    let dir = TempDir::new().unwrap();
    for handler in all_handlers(&dir) {
        let data = handler.read("../escape").unwrap();
        assert!(data.is_empty(), "{}", handler.name());
        assert!(handler.destroy("../escape").is_ok(), "{}", handler.name());
    }
}

#[test]
fn test_destroy_is_idempotent() {
    let dir = TempDir::new().unwrap();
    for handler in all_handlers(&dir) {
        handler.write("abc", b"payload").unwrap();
        assert!(handler.destroy("abc").is_ok(), "{}", handler.name());
        assert!(handler.destroy("abc").is_ok(), "{}", handler.name());
        assert!(handler.destroy("never").is_ok(), "{}", handler.name());
    }
}

#[test]
fn test_gc_keeps_live_records() {
    let dir = TempDir::new().unwrap();
    for handler in all_handlers(&dir) {
        handler.write("abc", b"payload").unwrap();
        assert!(handler.gc(60).is_ok(), "{}", handler.name());
        assert_eq!(handler.read("abc").unwrap(), b"payload", "{}", handler.name());
    }
}

#[test]
fn test_prefixes_share_backend_without_collision() {
    let cache = Arc::new(LocalCache::new());
    let app = CacheHandler::new(Arc::clone(&cache), HandlerOptions::new("app_", 60));
    let admin = CacheHandler::new(Arc::clone(&cache), HandlerOptions::new("admin_", 60));

    app.write("same", b"app").unwrap();
    admin.write("same", b"admin").unwrap();

    assert_eq!(app.read("same").unwrap(), b"app");
    assert_eq!(admin.read("same").unwrap(), b"admin");
    assert_eq!(cache.len(), 2);
}

// ============================================================================
// Cache backend against a mock client
// ============================================================================

#[derive(Default)]
struct MockCache {
    sets: Mutex<Vec<(String, Vec<u8>, u64)>>,
    deletes: Mutex<Vec<String>>,
}

impl CacheClient for MockCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok((key == "jfwtest_id").then(|| b"foo".to_vec()))
    }

    fn set(&self, key: &str, value: &[u8], expiration: u64) -> Result<()> {
        self.sets
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_vec(), expiration));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.deletes.lock().unwrap().push(key.to_string());
        Ok(true)
    }
}

#[test]
fn test_cache_handler_is_supported() {
    assert!(CacheHandler::<MockCache>::is_supported());
}

#[test]
fn test_cache_reads_prefixed_key() {
    let handler = CacheHandler::new(MockCache::default(), options());
    assert_eq!(handler.read("id").unwrap(), b"foo");
}

#[test]
fn test_cache_write_sets_expiration_within_tolerance() {
    let handler = CacheHandler::new(MockCache::default(), options());
    assert!(handler.write("id", b"data").is_ok());

    let sets = handler.client().sets.lock().unwrap();
    assert_eq!(sets.len(), 1);
    let (key, value, expiration) = &sets[0];
    assert_eq!(key, "jfwtest_id");
    assert_eq!(value, b"data");
    assert!(expiration.abs_diff(now() + 1000) <= 2);
}

#[test]
fn test_cache_destroy_deletes_prefixed_key() {
    let handler = CacheHandler::new(MockCache::default(), options());
    assert!(handler.destroy("id").is_ok());
    assert_eq!(*handler.client().deletes.lock().unwrap(), vec!["jfwtest_id"]);
}

#[test]
fn test_cache_gc_touches_nothing() {
    let handler = CacheHandler::new(MockCache::default(), options());
    assert_eq!(handler.gc(60).unwrap(), 0);
    assert!(handler.client().sets.lock().unwrap().is_empty());
    assert!(handler.client().deletes.lock().unwrap().is_empty());
}

// ============================================================================
// Registry
// ============================================================================

/// Client for a cache library that is not installed.
struct AbsentClient;

impl CacheClient for AbsentClient {
    fn is_available() -> bool {
        false
    }
    fn get(&self, _: &str) -> Result<Option<Vec<u8>>> {
        Err(SessionError::BackendFailure("not installed".into()))
    }
    fn set(&self, _: &str, _: &[u8], _: u64) -> Result<()> {
        Err(SessionError::BackendFailure("not installed".into()))
    }
    fn delete(&self, _: &str) -> Result<bool> {
        Err(SessionError::BackendFailure("not installed".into()))
    }
}

#[test]
fn test_registry_unsupported_backend() {
    let mut registry = HandlerRegistry::new();
    registry.register_cache(AbsentClient);

    let result = registry.resolve("cache", &options());
    assert!(matches!(result, Err(SessionError::BackendUnavailable(_))));
}

#[test]
fn test_registry_unknown_backend() {
    let registry = HandlerRegistry::with_defaults();
    let result = registry.resolve("memcached", &options());
    assert!(matches!(result, Err(SessionError::BackendUnavailable(_))));
}

#[test]
fn test_registry_ignores_unknown_options() {
    let options: HandlerOptions =
        serde_json::from_str(r#"{"prefix": "x_", "ttl": 30, "compression": true}"#).unwrap();
    let registry = HandlerRegistry::with_defaults();
    let handler = registry.resolve("memory", &options).unwrap();

    handler.write("abc", b"1").unwrap();
    assert_eq!(handler.read("abc").unwrap(), b"1");
}

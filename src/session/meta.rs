//! Bookkeeping stored alongside the user's variables.

use serde_json::{json, Value};

use super::encoder::NamespaceMap;
use super::NamespaceStore;

/// Namespace reserved for session bookkeeping inside the encoded record.
pub const META_NAMESPACE: &str = "__session";

/// Timers, start counter and form token of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionMeta {
    /// Unix seconds of the first start.
    pub started_at: u64,
    /// Unix seconds of the most recent start.
    pub last_access: u64,
    /// Number of times the session was started.
    pub counter: u64,
    /// Anti-forgery token, generated on demand.
    pub token: Option<String>,
}

impl SessionMeta {
    pub fn new(now: u64) -> Self {
        Self {
            started_at: now,
            last_access: now,
            counter: 0,
            token: None,
        }
    }

    /// Remove the reserved namespace from `store` and parse it.
    ///
    /// Returns `None` when the record carried no bookkeeping.
    pub fn take_from(store: &mut NamespaceStore) -> Option<Self> {
        let start = store.remove("timer.start", META_NAMESPACE);
        let last = store.remove("timer.last", META_NAMESPACE);
        let counter = store.remove("counter", META_NAMESPACE);
        let token = store.remove("token", META_NAMESPACE);

        // Unknown keys in the reserved namespace are dropped with it.
        let leftovers: Vec<_> = store
            .entries()
            .into_iter()
            .filter(|v| v.namespace == META_NAMESPACE)
            .collect();
        for var in leftovers {
            store.remove(&var.name, META_NAMESPACE);
        }

        let started_at = start.as_ref().and_then(Value::as_u64)?;
        Some(Self {
            started_at,
            last_access: last.as_ref().and_then(Value::as_u64).unwrap_or(started_at),
            counter: counter.as_ref().and_then(Value::as_u64).unwrap_or(0),
            token: token.and_then(|t| t.as_str().map(str::to_string)),
        })
    }

    /// Add the reserved namespace to an encoded-to-be map.
    pub fn put_into(&self, map: &mut NamespaceMap) {
        let ns = map.entry(META_NAMESPACE.to_string()).or_default();
        ns.insert("timer.start".into(), json!(self.started_at));
        ns.insert("timer.last".into(), json!(self.last_access));
        ns.insert("counter".into(), json!(self.counter));
        if let Some(token) = &self.token {
            ns.insert("token".into(), json!(token));
        }
    }

    /// Whether more than `expire_minutes` passed since the last start.
    ///
    /// An expiry of zero disables the check.
    pub fn is_expired(&self, now: u64, expire_minutes: u64) -> bool {
        expire_minutes > 0
            && now.saturating_sub(self.last_access) > expire_minutes.saturating_mul(60)
    }

    /// Record a start at `now`.
    pub fn touch(&mut self, now: u64) {
        self.last_access = now;
        self.counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_through_store() {
        let mut meta = SessionMeta::new(1_000);
        meta.touch(1_060);
        meta.token = Some("tok".into());

        let mut map = NamespaceMap::new();
        meta.put_into(&mut map);
        let mut store = NamespaceStore::from_map(map);

        assert_eq!(SessionMeta::take_from(&mut store), Some(meta));
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_meta() {
        let mut store = NamespaceStore::new();
        store.set("user", json!("bob"), "default");
        assert_eq!(SessionMeta::take_from(&mut store), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_expiry() {
        let meta = SessionMeta::new(0);
        assert!(!meta.is_expired(15 * 60, 15));
        assert!(meta.is_expired(15 * 60 + 1, 15));
        assert!(!meta.is_expired(u64::MAX, 0));
    }

    #[test]
    fn test_huge_expiry_never_lapses() {
        let meta = SessionMeta::new(0);
        assert!(!meta.is_expired(1_000_000, u64::MAX / 2));
        assert!(!meta.is_expired(u64::MAX, u64::MAX));
    }

    #[test]
    fn test_touch_counts() {
        let mut meta = SessionMeta::new(10);
        meta.touch(20);
        meta.touch(30);
        assert_eq!(meta.counter, 2);
        assert_eq!(meta.last_access, 30);
        assert_eq!(meta.started_at, 10);
    }
}

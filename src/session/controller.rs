//! Session lifecycle controller.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::encoder::{JsonEncoder, SessionEncoder};
use super::meta::{SessionMeta, META_NAMESPACE};
use super::namespace::{NamespaceStore, Variable, DEFAULT_NAMESPACE};
use super::{SessionId, SessionState};
use crate::error::SessionError;
use crate::handler::{unix_now, StorageHandler};
use crate::Result;

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session name, passed to the backend on open.
    pub name: String,
    /// Minutes of inactivity after which the session expires (0 = never).
    pub expire: u64,
    /// Identifier received from the client, used on the first start.
    pub id: Option<String>,
    /// Backend location passed to `open` (empty = backend default).
    pub save_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "VAULTSID".to_string(),
            expire: 15,
            id: None,
            save_path: String::new(),
        }
    }
}

impl SessionConfig {
    /// Configuration resuming the session with the given identifier.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }
}

/// A single session, driven through its lifecycle by one request.
///
/// The controller owns the decoded variables while the session is active
/// and talks to the backend only at lifecycle points: `start` reads,
/// `close` and `fork` write, `destroy` deletes. Backend faults never escape
/// these methods; they are logged and reported as `false`.
///
/// An active session that is dropped without `close()` is written back.
pub struct Session {
    handler: Arc<dyn StorageHandler>,
    encoder: Box<dyn SessionEncoder>,
    config: SessionConfig,
    state: SessionState,
    id: Option<SessionId>,
    store: Option<NamespaceStore>,
    meta: Option<SessionMeta>,
    is_new: bool,
}

impl Session {
    /// Create a session using the JSON encoder.
    pub fn new(handler: Arc<dyn StorageHandler>, config: SessionConfig) -> Self {
        Self::with_encoder(handler, Box::new(JsonEncoder), config)
    }

    /// Create a session with a custom payload encoder.
    pub fn with_encoder(
        handler: Arc<dyn StorageHandler>,
        encoder: Box<dyn SessionEncoder>,
        config: SessionConfig,
    ) -> Self {
        Self {
            handler,
            encoder,
            config,
            state: SessionState::New,
            id: None,
            store: None,
            meta: None,
            is_new: false,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Expiry in minutes.
    pub fn expire(&self) -> u64 {
        self.config.expire
    }

    /// Session name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current identifier, if one has been assigned.
    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    /// Check if the session is active.
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Check if the last start found no usable stored record.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Number of times this session has been started.
    pub fn counter(&self) -> u64 {
        self.meta.as_ref().map_or(0, |m| m.counter)
    }

    /// Unix seconds of the first start.
    pub fn started_at(&self) -> Option<u64> {
        self.meta.as_ref().map(|m| m.started_at)
    }

    /// The backend this session persists to.
    pub fn handler(&self) -> &Arc<dyn StorageHandler> {
        &self.handler
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the session, loading its variables from the backend.
    ///
    /// Starting an active session does nothing and succeeds. An expired or
    /// locked session refuses to start; use [`Session::restart`].
    pub fn start(&mut self) -> bool {
        if self.is_active() {
            return true;
        }
        if !self.state.can_start() {
            warn!(state = %self.state, "session must be restarted before use");
            return false;
        }

        let id = self.resolve_id();

        if let Err(e) = self.handler.open(&self.config.save_path, &self.config.name) {
            error!(backend = self.handler.name(), error = %e, "failed to open storage");
            return false;
        }

        let raw = match self.handler.read(id.as_str()) {
            Ok(raw) => raw,
            Err(SessionError::Locked(_)) => {
                warn!(id = %id, "session record locked by another holder");
                self.config.id = None;
                self.id = Some(id);
                self.transition(SessionState::Locked);
                return false;
            }
            Err(e) => {
                error!(id = %id, backend = self.handler.name(), error = %e, "failed to read session");
                return false;
            }
        };

        let mut store = NamespaceStore::decode_or_empty(self.encoder.as_ref(), &raw);
        let now = unix_now();
        let found = SessionMeta::take_from(&mut store);

        // Nothing usable on record, whether absent or undecodable.
        self.is_new = found.is_none() && store.is_empty();
        self.config.id = None;
        self.id = Some(id);

        let mut meta = found.unwrap_or_else(|| SessionMeta::new(now));

        if meta.is_expired(now, self.config.expire) {
            info!(id = %self.display_id(), "session expired");
            self.meta = Some(meta);
            self.transition(SessionState::Expired);
            return false;
        }

        meta.touch(now);
        self.meta = Some(meta);
        self.store = Some(store);
        self.transition(SessionState::Active);
        true
    }

    /// Write the session back and release its variables.
    ///
    /// Closing a session that is not active does nothing and succeeds. If
    /// the write fails the session stays active so it can be retried.
    pub fn close(&mut self) -> bool {
        if !self.is_active() {
            debug!(state = %self.state, "close ignored");
            return true;
        }

        if let Err(e) = self.persist() {
            error!(id = %self.display_id(), error = %e, "failed to write session");
            return false;
        }

        self.store = None;
        self.transition(SessionState::Closed);
        true
    }

    /// Delete every variable and the stored record, invalidating the id.
    ///
    /// The next `start()` mints a new identifier.
    pub fn destroy(&mut self) -> bool {
        if matches!(self.state, SessionState::New | SessionState::Destroyed) {
            return true;
        }

        if let Some(id) = &self.id {
            if let Err(e) = self.handler.destroy(id.as_str()) {
                error!(id = %id, error = %e, "failed to destroy session");
                return false;
            }
        }

        if let Some(store) = self.store.as_mut() {
            store.clear();
        }
        self.store = None;
        self.meta = None;
        self.id = None;
        self.is_new = false;
        self.transition(SessionState::Destroyed);
        true
    }

    /// Destroy the session and start a fresh one.
    pub fn restart(&mut self) -> bool {
        self.destroy() && self.start()
    }

    /// Move the variables to a new identifier.
    ///
    /// The record under the old identifier is left as it is, so other
    /// holders of the old identifier keep working.
    pub fn fork(&mut self) -> bool {
        if !self.is_active() {
            warn!(state = %self.state, "only an active session can be forked");
            return false;
        }

        let new_id = SessionId::generate();
        let data = match self.encode_record() {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "failed to encode session for fork");
                return false;
            }
        };
        if let Err(e) = self.handler.write(new_id.as_str(), &data) {
            error!(id = %new_id, error = %e, "failed to write forked session");
            return false;
        }

        info!(from = %self.display_id(), to = %new_id, "session forked");
        self.id = Some(new_id);
        true
    }

    /// Like [`Session::fork`], but also deletes the old record.
    pub fn regenerate(&mut self) -> bool {
        let old = self.id.clone();
        if !self.fork() {
            return false;
        }
        if let Some(old) = old {
            if let Err(e) = self.handler.destroy(old.as_str()) {
                warn!(id = %old, error = %e, "old session record left behind");
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    /// Get a variable from the default namespace.
    pub fn get(&self, name: &str, default: impl Into<Value>) -> Value {
        self.get_in(DEFAULT_NAMESPACE, name, default)
    }

    /// Get a variable, or `default` if it is not set.
    ///
    /// Reading from a session that is not active yields `default`.
    pub fn get_in(&self, namespace: &str, name: &str, default: impl Into<Value>) -> Value {
        self.store
            .as_ref()
            .and_then(|s| s.get(name, namespace))
            .cloned()
            .unwrap_or_else(|| default.into())
    }

    /// Get a variable from the default namespace as a typed value.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.get_as_in(DEFAULT_NAMESPACE, name)
    }

    /// Get a variable as a typed value, `None` if absent or of another shape.
    pub fn get_as_in<T: DeserializeOwned>(&self, namespace: &str, name: &str) -> Option<T> {
        let value = self.store.as_ref()?.get(name, namespace)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Set a variable in the default namespace.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        self.set_in(DEFAULT_NAMESPACE, name, value)
    }

    /// Set a variable, returning its previous value.
    ///
    /// The bookkeeping namespace [`META_NAMESPACE`](crate::session::META_NAMESPACE)
    /// cannot be written.
    pub fn set_in(
        &mut self,
        namespace: &str,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Value>> {
        Ok(self.active_store(namespace)?.set(name, value.into(), namespace))
    }

    /// Serialize and set a variable in the default namespace.
    pub fn set_as<T: Serialize>(&mut self, name: &str, value: &T) -> Result<Option<Value>> {
        let value = serde_json::to_value(value).map_err(|e| SessionError::Encode(e.to_string()))?;
        self.set(name, value)
    }

    /// Check whether a variable exists in the default namespace.
    pub fn has(&self, name: &str) -> bool {
        self.has_in(DEFAULT_NAMESPACE, name)
    }

    /// Check whether a variable exists.
    pub fn has_in(&self, namespace: &str, name: &str) -> bool {
        self.store
            .as_ref()
            .map_or(false, |s| s.has(name, namespace))
    }

    /// Remove a variable from the default namespace.
    pub fn remove(&mut self, name: &str) -> Result<Option<Value>> {
        self.remove_in(DEFAULT_NAMESPACE, name)
    }

    /// Remove a variable, returning its value if it was set.
    pub fn remove_in(&mut self, namespace: &str, name: &str) -> Result<Option<Value>> {
        Ok(self.active_store(namespace)?.remove(name, namespace))
    }

    /// Remove every variable. The session stays active with the same id.
    pub fn clear(&mut self) -> Result<()> {
        self.active_store(DEFAULT_NAMESPACE)?.clear();
        Ok(())
    }

    /// Snapshot of all variables.
    pub fn iter(&self) -> std::vec::IntoIter<Variable> {
        self.store
            .as_ref()
            .map(NamespaceStore::entries)
            .unwrap_or_default()
            .into_iter()
    }

    // ------------------------------------------------------------------
    // Form token
    // ------------------------------------------------------------------

    /// Get the session's anti-forgery token, creating it if needed.
    ///
    /// Returns `None` when the session is not active.
    pub fn token(&mut self, force_new: bool) -> Option<String> {
        if !self.is_active() {
            return None;
        }
        let meta = self.meta.as_mut()?;
        if force_new || meta.token.is_none() {
            let mut bytes = [0u8; 16];
            OsRng.fill_bytes(&mut bytes);
            meta.token = Some(hex::encode(bytes));
        }
        meta.token.clone()
    }

    /// Check a submitted token against the session's token.
    pub fn has_token(&self, token: &str) -> bool {
        self.is_active()
            && self
                .meta
                .as_ref()
                .and_then(|m| m.token.as_deref())
                .map_or(false, |t| t == token)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn resolve_id(&mut self) -> SessionId {
        if self.state == SessionState::Closed {
            if let Some(id) = &self.id {
                return id.clone();
            }
        }

        // A supplied identifier is used until a read gets through, never
        // after destroy.
        if self.state == SessionState::New {
            if let Some(supplied) = &self.config.id {
                match supplied.parse() {
                    Ok(id) => return id,
                    Err(e) => warn!(error = %e, "ignoring supplied session id"),
                }
            }
        }

        SessionId::generate()
    }

    fn active_store(&mut self, namespace: &str) -> Result<&mut NamespaceStore> {
        if namespace == META_NAMESPACE {
            return Err(SessionError::ReservedNamespace(namespace.to_string()));
        }
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive(self.state));
        }
        self.store
            .as_mut()
            .ok_or(SessionError::NotActive(self.state))
    }

    fn encode_record(&self) -> Result<Vec<u8>> {
        let mut map = self
            .store
            .as_ref()
            .map(|s| s.as_map().clone())
            .unwrap_or_default();
        if let Some(meta) = &self.meta {
            meta.put_into(&mut map);
        }
        self.encoder.encode(&map)
    }

    fn persist(&self) -> Result<()> {
        let id = self
            .id
            .as_ref()
            .ok_or(SessionError::NotActive(self.state))?;
        let data = self.encode_record()?;
        self.handler.write(id.as_str(), &data)
    }

    fn transition(&mut self, target: SessionState) {
        let from = self.state;
        match self.state.transition_to(target) {
            Ok(()) => info!(id = %self.display_id(), from = %from, to = %target, "session state changed"),
            Err(e) => warn!(error = %e, "session state unchanged"),
        }
    }

    fn display_id(&self) -> &str {
        self.id.as_ref().map_or("-", |id| id.as_str())
    }
}

impl<'a> IntoIterator for &'a Session {
    type Item = Variable;
    type IntoIter = std::vec::IntoIter<Variable>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(e) = self.persist() {
                error!(id = %self.display_id(), error = %e, "failed to write session on drop");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.config.name)
            .field("backend", &self.handler.name())
            .field("state", &self.state)
            .field("id", &self.id)
            .field("is_new", &self.is_new)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerOptions, MemoryHandler};
    use serde_json::json;

    fn memory() -> Arc<dyn StorageHandler> {
        Arc::new(MemoryHandler::new(HandlerOptions::new("ctl_", 3600)))
    }

    fn started() -> Session {
        let mut session = Session::new(memory(), SessionConfig::default());
        assert!(session.start());
        session
    }

    #[test]
    fn test_new_session_state() {
        let session = Session::new(memory(), SessionConfig::default());
        assert_eq!(session.state(), SessionState::New);
        assert!(session.id().is_none());
        assert!(!session.is_active());
        assert_eq!(session.name(), "VAULTSID");
        assert_eq!(session.expire(), 15);
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut session = started();
        let id = session.id().cloned();
        assert!(session.start());
        assert_eq!(session.id().cloned(), id);
        assert_eq!(session.counter(), 1);
    }

    #[test]
    fn test_start_fresh_session_is_new() {
        let session = started();
        assert!(session.is_active());
        assert!(session.is_new());
        assert_eq!(session.iter().count(), 0);
    }

    #[test]
    fn test_supplied_id_used() {
        let mut session = Session::new(memory(), SessionConfig::with_id("client-supplied"));
        assert!(session.start());
        assert_eq!(session.id().unwrap().as_str(), "client-supplied");
    }

    #[test]
    fn test_invalid_supplied_id_replaced() {
        let mut session = Session::new(memory(), SessionConfig::with_id("../../etc"));
        assert!(session.start());
        assert_ne!(session.id().unwrap().as_str(), "../../etc");
    }

    #[test]
    fn test_mutation_after_close_rejected() {
        let mut session = started();
        session.set("a", 1).unwrap();
        assert!(session.close());
        assert_eq!(session.state(), SessionState::Closed);

        assert!(matches!(
            session.set("a", 2),
            Err(SessionError::NotActive(SessionState::Closed))
        ));
        assert!(session.remove("a").is_err());
        assert!(session.clear().is_err());
        assert_eq!(session.get("a", "fallback"), json!("fallback"));
        assert!(!session.has("a"));
    }

    #[test]
    fn test_close_twice_is_noop() {
        let mut session = started();
        assert!(session.close());
        assert!(session.close());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_reopen_after_close() {
        let mut session = started();
        session.set("kept", "yes").unwrap();
        let id = session.id().cloned();
        assert!(session.close());

        assert!(session.start());
        assert_eq!(session.id().cloned(), id);
        assert!(!session.is_new());
        assert_eq!(session.get("kept", Value::Null), json!("yes"));
        assert_eq!(session.counter(), 2);
    }

    #[test]
    fn test_destroy_before_start() {
        let mut session = Session::new(memory(), SessionConfig::default());
        assert!(session.destroy());
        assert_eq!(session.state(), SessionState::New);
    }

    #[test]
    fn test_fork_requires_active() {
        let mut session = Session::new(memory(), SessionConfig::default());
        assert!(!session.fork());
    }

    #[test]
    fn test_typed_helpers() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Cart {
            items: Vec<String>,
        }

        let mut session = started();
        let cart = Cart {
            items: vec!["apple".into()],
        };
        session.set_as("cart", &cart).unwrap();
        assert_eq!(session.get_as::<Cart>("cart"), Some(cart));
        assert_eq!(session.get_as::<u32>("cart"), None);
        assert_eq!(session.get_as::<u32>("missing"), None);
    }

    #[test]
    fn test_token() {
        let mut session = started();
        let token = session.token(false).unwrap();
        assert_eq!(token.len(), 32);
        assert_eq!(session.token(false), Some(token.clone()));
        assert!(session.has_token(&token));

        let fresh = session.token(true).unwrap();
        assert_ne!(fresh, token);
        assert!(!session.has_token(&token));
    }

    #[test]
    fn test_token_survives_close() {
        let mut session = started();
        let token = session.token(false).unwrap();
        session.close();
        assert!(session.token(false).is_none());

        session.start();
        assert!(session.has_token(&token));
    }

    #[test]
    fn test_metadata_hidden_from_iteration() {
        let mut session = started();
        session.token(false);
        session.set("visible", true).unwrap();
        session.close();
        session.start();

        let vars: Vec<_> = session.iter().collect();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name, "visible");
    }

    #[test]
    fn test_drop_writes_back() {
        let handler = memory();
        let id = {
            let mut session = Session::new(Arc::clone(&handler), SessionConfig::default());
            session.start();
            session.set("saved", 42).unwrap();
            session.id().cloned().unwrap()
        };

        let mut resumed = Session::new(handler, SessionConfig::with_id(id.as_str()));
        assert!(resumed.start());
        assert_eq!(resumed.get("saved", 0), json!(42));
    }

    #[test]
    fn test_timers_survive_reopen() {
        let mut session = started();
        let first = session.started_at();
        assert!(first.is_some());
        assert!(session.close());

        assert!(session.start());
        assert_eq!(session.started_at(), first);
        assert_eq!(session.counter(), 2);
    }
}

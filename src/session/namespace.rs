//! Namespaced variable storage for an active session.

use serde_json::Value;
use tracing::warn;

use super::encoder::{NamespaceMap, SessionEncoder};
use crate::Result;

/// Namespace used when the caller does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// One variable held by a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Namespace the variable lives in.
    pub namespace: String,
    /// Variable name.
    pub name: String,
    /// Stored value.
    pub value: Value,
}

/// In-memory variables of a session, partitioned by namespace.
///
/// A lookup that finds nothing yields `None`, which is distinct from a
/// stored JSON `null` (`Some(Value::Null)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceStore {
    namespaces: NamespaceMap,
}

impl NamespaceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already decoded namespace map.
    pub fn from_map(namespaces: NamespaceMap) -> Self {
        Self { namespaces }
    }

    /// Decode a raw record, substituting an empty store for corrupt data.
    ///
    /// An empty blob is a missing record and decodes to an empty store.
    pub fn decode_or_empty(encoder: &dyn SessionEncoder, bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::new();
        }
        match encoder.decode(bytes) {
            Ok(map) => Self::from_map(map),
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "discarding undecodable session record");
                Self::new()
            }
        }
    }

    /// Encode the store into a raw record.
    pub fn encode(&self, encoder: &dyn SessionEncoder) -> Result<Vec<u8>> {
        encoder.encode(&self.namespaces)
    }

    /// Get a variable.
    pub fn get(&self, name: &str, namespace: &str) -> Option<&Value> {
        self.namespaces.get(namespace).and_then(|ns| ns.get(name))
    }

    /// Set a variable, returning the previous value if there was one.
    pub fn set(&mut self, name: &str, value: Value, namespace: &str) -> Option<Value> {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), value)
    }

    /// Check whether a variable exists.
    pub fn has(&self, name: &str, namespace: &str) -> bool {
        self.get(name, namespace).is_some()
    }

    /// Remove a variable, returning its value if it existed.
    ///
    /// A namespace left without variables is dropped.
    pub fn remove(&mut self, name: &str, namespace: &str) -> Option<Value> {
        let ns = self.namespaces.get_mut(namespace)?;
        let previous = ns.remove(name);
        if ns.is_empty() {
            self.namespaces.remove(namespace);
        }
        previous
    }

    /// Remove every namespace and variable.
    pub fn clear(&mut self) {
        self.namespaces.clear();
    }

    /// Check whether no variables are stored.
    pub fn is_empty(&self) -> bool {
        self.namespaces.values().all(|ns| ns.is_empty())
    }

    /// Total number of variables across namespaces.
    pub fn len(&self) -> usize {
        self.namespaces.values().map(|ns| ns.len()).sum()
    }

    /// Names of the namespaces currently holding variables.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(|k| k.as_str())
    }

    /// Snapshot of every variable, ordered by namespace then name.
    pub fn entries(&self) -> Vec<Variable> {
        self.namespaces
            .iter()
            .flat_map(|(namespace, vars)| {
                vars.iter().map(move |(name, value)| Variable {
                    namespace: namespace.clone(),
                    name: name.clone(),
                    value: value.clone(),
                })
            })
            .collect()
    }

    /// Borrow the underlying namespace map.
    pub fn as_map(&self) -> &NamespaceMap {
        &self.namespaces
    }
}

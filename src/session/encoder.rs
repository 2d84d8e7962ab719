//! Payload encoding for session records.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::SessionError;
use crate::Result;

/// Decoded session payload: namespace -> (name -> value).
pub type NamespaceMap = BTreeMap<String, BTreeMap<String, Value>>;

/// Converts the decoded namespace map to and from the raw record bytes.
///
/// Implementations must satisfy `decode(encode(x)) == x`.
pub trait SessionEncoder: Send + Sync {
    /// Encode the namespace map into a blob.
    fn encode(&self, map: &NamespaceMap) -> Result<Vec<u8>>;

    /// Decode a blob into a namespace map.
    fn decode(&self, bytes: &[u8]) -> Result<NamespaceMap>;
}

/// JSON encoder backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl SessionEncoder for JsonEncoder {
    fn encode(&self, map: &NamespaceMap) -> Result<Vec<u8>> {
        serde_json::to_vec(map).map_err(|e| SessionError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<NamespaceMap> {
        serde_json::from_slice(bytes).map_err(|e| SessionError::Decode(e.to_string()))
    }
}

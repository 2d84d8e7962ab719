//! Session management module.
//!
//! This module provides the session lifecycle controller together with
//! session identification, state tracking, namespaced variable storage
//! and payload encoding.

mod controller;
mod encoder;
mod id;
mod meta;
mod namespace;
mod state;

pub use controller::{Session, SessionConfig};
pub use encoder::{JsonEncoder, NamespaceMap, SessionEncoder};
pub use id::SessionId;
pub use meta::META_NAMESPACE;
pub use namespace::{NamespaceStore, Variable, DEFAULT_NAMESPACE};
pub use state::SessionState;

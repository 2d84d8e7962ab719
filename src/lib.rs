//! # session-vault
//!
//! Storage-agnostic server-side session state.
//!
//! This crate separates the lifecycle of a session (start, read and write
//! variables, close, destroy, fork) from the medium its data is stored in.
//! Backends implement a small [`StorageHandler`] contract and are chosen
//! by name through the [`HandlerRegistry`].
//!
//! ## Features
//!
//! - **Pluggable storage**: memory, cache client, filesystem and SQLite backends
//! - **Namespaces**: variables with the same name in different namespaces never collide
//! - **Lifecycle state machine**: new, active, expired, locked, closed, destroyed
//! - **Resilient start**: a corrupt record becomes an empty session, not an error
//!
//! ## Quick Start
//!
//! ```no_run
//! use session_vault::{HandlerOptions, HandlerRegistry, Session, SessionConfig};
//!
//! fn main() -> session_vault::Result<()> {
//!     // Initialize logging
//!     session_vault::logging::try_init().ok();
//!
//!     // Resolve a backend
//!     let registry = HandlerRegistry::with_defaults();
//!     let handler = registry.resolve_shared("memory", &HandlerOptions::default())?;
//!
//!     // Start a session and store a variable
//!     let mut session = Session::new(handler, SessionConfig::default());
//!     session.start();
//!     session.set("user", "alice")?;
//!     session.set_in("cart", "items", 3)?;
//!
//!     println!("Session {:?} holds {} variables", session.id(), session.iter().count());
//!
//!     // Write back and release
//!     session.close();
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod session;

// Re-export commonly used types
pub use error::{Result, SessionError};
pub use handler::{
    CacheClient, CacheHandler, FileHandler, HandlerOptions, HandlerRegistry, LocalCache,
    MemoryHandler, StorageHandler,
};
#[cfg(feature = "sqlite")]
pub use handler::DatabaseHandler;
pub use session::{
    JsonEncoder, NamespaceStore, Session, SessionConfig, SessionEncoder, SessionId, SessionState,
    Variable, DEFAULT_NAMESPACE, META_NAMESPACE,
};

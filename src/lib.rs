//! Identify: customer identity reconciliation
//!
//! Contact records that share an email address or phone number belong to
//! the same customer. This crate keeps those records linked into clusters
//! and answers "who is this?" for any email/phone pair.
//!
//! # Core Concepts
//!
//! - **Contacts**: stored records holding an email, a phone, or both
//! - **Clusters**: one Representative (the oldest record) plus its Members
//! - **Identify**: match the submitted facts, merge clusters they bridge,
//!   record anything new, and return the consolidated identity
//!
//! # Example
//!
//! ```
//! use identify::{IdentifyRequest, IdentityEngine, OpenStore, SqliteStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::open_in_memory().unwrap());
//! let engine = IdentityEngine::new(store);
//! let request = IdentifyRequest::new(Some("doc@hillvalley.edu".into()), None).unwrap();
//! let identity = engine.identify(&request).unwrap();
//! assert_eq!(identity.emails, vec!["doc@hillvalley.edu"]);
//! ```

pub mod api;
pub mod config;
pub mod contact;
pub mod reconcile;
pub mod storage;

pub use api::{IdentifyPayload, IdentifyResponse, IdentityApi, PhoneValue};
pub use config::{Config, ConfigError};
pub use contact::{Contact, ContactId, LinkRole, NewContact};
pub use reconcile::{ConsolidatedIdentity, IdentifyRequest, IdentityEngine, ReconcileError, ReconcileResult};
pub use storage::{
    CommitGate, ContactStore, ContactTx, OpenStore, SqliteStore, StorageError, StorageResult,
    StoreOptions,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

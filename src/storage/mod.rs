//! Storage backends for contacts
//!
//! The identity core talks to storage only through the `ContactStore` trait.
//! The primary implementation is `SqliteStore` for persistent storage.

mod pool;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    CommitGate, ContactStore, ContactTx, OpenStore, StorageError, StorageResult, StoreOptions,
};

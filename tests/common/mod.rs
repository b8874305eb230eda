//! Common test utilities for identify integration tests
//!
//! File-backed stores in temporary directories, request helpers, and a
//! whole-table invariant checker.

#![allow(dead_code)]

pub mod invariants;

pub use invariants::{check_invariants, linked_components};

use identify::{
    Contact, ContactId, ContactStore, IdentifyRequest, IdentityApi, IdentityEngine, OpenStore,
    SqliteStore, StoreOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A store on a fresh database file. Keep the `TempDir` alive for the
/// duration of the test.
pub fn file_store(options: StoreOptions) -> (TempDir, Arc<SqliteStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_with(dir.path().join("contacts.db"), options).unwrap();
    (dir, Arc::new(store))
}

pub fn api_for(store: Arc<SqliteStore>) -> IdentityApi<SqliteStore> {
    IdentityApi::new(Arc::new(IdentityEngine::new(store)), Duration::from_secs(30))
}

pub fn req(email: Option<&str>, phone: Option<&str>) -> IdentifyRequest {
    IdentifyRequest::new(email.map(str::to_string), phone.map(str::to_string)).unwrap()
}

/// Every live contact, in id order.
///
/// Ids are assigned from 1 and never reused, so scanning upward until
/// `count_contacts` records are found covers the table.
pub fn all_contacts<S: ContactStore>(store: &S) -> Vec<Contact> {
    let total = store.count_contacts().unwrap();
    let mut found = Vec::with_capacity(total);
    let mut next = 1;
    while found.len() < total {
        assert!(next <= (total as i64) * 4 + 16, "contact ids are sparse");
        if let Some(contact) = store.load_contact(ContactId::new(next)).unwrap() {
            found.push(contact);
        }
        next += 1;
    }
    found
}

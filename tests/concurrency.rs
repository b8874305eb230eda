//! Concurrent identify calls against one database file
//!
//! Run with: `cargo test --test concurrency`

mod common;

use common::{all_contacts, api_for, check_invariants, file_store, req};
use identify::{
    ContactStore, IdentityApi, IdentityEngine, LinkRole, OpenStore, ReconcileError, SqliteStore,
    StoreOptions,
};
use std::collections::HashSet;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_new_identity_creates_one_representative() {
    let (_dir, store) = file_store(StoreOptions::default());
    let api = api_for(store.clone());

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let api = api.clone();
        tasks.spawn(async move { api.identify(req(Some("marty@hillvalley.edu"), None)).await });
    }

    let mut primaries = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        let identity = joined.unwrap().unwrap();
        assert!(identity.secondary_contact_ids.is_empty());
        primaries.insert(identity.primary_contact_id);
    }

    assert_eq!(primaries.len(), 1, "all callers see the same primary");
    let contacts = all_contacts(store.as_ref());
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].link_role, LinkRole::Representative);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_new_facts_for_one_identity_are_recorded_once() {
    let (_dir, store) = file_store(StoreOptions::default());
    let api = api_for(store.clone());
    let rep = api.identify(req(Some("doc@hillvalley.edu"), None)).await.unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..3 {
        for phone in ["121", "122", "123"] {
            let api = api.clone();
            tasks.spawn(async move { api.identify(req(Some("doc@hillvalley.edu"), Some(phone))).await });
        }
    }
    while let Some(joined) = tasks.join_next().await {
        let identity = joined.unwrap().unwrap();
        assert_eq!(identity.primary_contact_id, rep.primary_contact_id);
    }

    // One member per distinct phone, however many callers raced on it
    assert_eq!(store.count_contacts().unwrap(), 4);
    check_invariants(&all_contacts(store.as_ref())).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bridges_settle_on_the_oldest_representative() {
    let (_dir, store) = file_store(StoreOptions::default());
    let api = api_for(store.clone());

    let mut seeds = Vec::new();
    for i in 0..5 {
        let email = format!("person{}@x.com", i);
        let phone = format!("{}00", i);
        seeds.push(api.identify(req(Some(&email), Some(&phone))).await.unwrap());
    }
    let oldest = seeds[0].primary_contact_id;

    // Each request bridges neighbouring clusters
    let mut tasks = JoinSet::new();
    for i in 0..4 {
        let api = api.clone();
        let email = format!("person{}@x.com", i);
        let phone = format!("{}00", i + 1);
        tasks.spawn(async move { api.identify(req(Some(&email), Some(&phone))).await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    let contacts = all_contacts(store.as_ref());
    check_invariants(&contacts).unwrap();
    assert_eq!(contacts.len(), 5, "bridges add no records");
    let reps: Vec<_> = contacts.iter().filter(|c| c.is_representative()).collect();
    assert_eq!(reps.len(), 1);
    assert_eq!(reps[0].id, oldest);

    let view = api.identify(req(Some("person4@x.com"), None)).await.unwrap();
    assert_eq!(view.primary_contact_id, oldest);
    assert_eq!(view.secondary_contact_ids.len(), 4);
}

#[test]
fn test_held_write_lock_gives_retryable_failure_then_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.db");
    let holder = Arc::new(SqliteStore::open(&path).unwrap());
    let impatient = Arc::new(
        SqliteStore::open_with(
            &path,
            StoreOptions {
                acquire_timeout: Duration::from_millis(100),
                ..StoreOptions::default()
            },
        )
        .unwrap(),
    );
    let engine = IdentityEngine::new(impatient);

    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let holding = std::thread::spawn(move || {
        let held: Result<(), identify::StorageError> = holder.unit_of_work(|_tx| {
            locked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            Ok(())
        });
        held.unwrap();
    });
    locked_rx.recv().unwrap();

    let err = engine.identify(&req(Some("biff@hillvalley.edu"), None)).unwrap_err();
    assert!(matches!(err, ReconcileError::StoreUnavailable(_)), "got {:?}", err);
    assert!(err.is_retryable());
    assert_eq!(engine.store().count_contacts().unwrap(), 0);

    release_tx.send(()).unwrap();
    holding.join().unwrap();

    let identity = engine.identify(&req(Some("biff@hillvalley.edu"), None)).unwrap();
    assert!(identity.secondary_contact_ids.is_empty());
    assert_eq!(engine.store().count_contacts().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_identify_commits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.db");
    let holder = Arc::new(SqliteStore::open(&path).unwrap());
    let patient = Arc::new(
        SqliteStore::open_with(
            &path,
            StoreOptions {
                acquire_timeout: Duration::from_secs(2),
                ..StoreOptions::default()
            },
        )
        .unwrap(),
    );
    let api = IdentityApi::new(
        Arc::new(IdentityEngine::new(patient.clone())),
        Duration::from_millis(100),
    );

    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let holding = std::thread::spawn(move || {
        let held: Result<(), identify::StorageError> = holder.unit_of_work(|_tx| {
            locked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            Ok(())
        });
        held.unwrap();
    });
    locked_rx.recv().unwrap();

    // The unit is still waiting on the write lock when the caller gives up
    let err = api.identify(req(Some("late@x.com"), None)).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Timeout(_)), "got {:?}", err);
    assert!(err.is_retryable());

    release_tx.send(()).unwrap();
    holding.join().unwrap();
    // Give the abandoned unit time to acquire the lock and finish
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(patient.count_contacts().unwrap(), 0);

    // The retry the caller was promised creates exactly one record
    let api = IdentityApi::new(
        Arc::new(IdentityEngine::new(patient.clone())),
        Duration::from_secs(5),
    );
    let identity = api.identify(req(Some("late@x.com"), None)).await.unwrap();
    assert!(identity.secondary_contact_ids.is_empty());
    assert_eq!(patient.count_contacts().unwrap(), 1);
}

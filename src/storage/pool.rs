//! Pooled SQLite connections
//!
//! File-backed stores hand out up to `max_connections` connections so
//! concurrent units of work contend on SQLite's own write lock. In-memory
//! stores hold exactly one connection, since each in-memory connection is a
//! separate database.

use super::traits::{StorageError, StorageResult, StoreOptions};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

pub(super) type SqliteConnection = PooledConnection<SqliteConnectionManager>;

#[derive(Debug, Clone)]
pub(super) enum PoolTarget {
    File(PathBuf),
    Memory,
}

pub(super) struct ConnectionPool {
    options: StoreOptions,
    /// `None` once closed
    inner: RwLock<Option<Pool<SqliteConnectionManager>>>,
}

impl ConnectionPool {
    pub(super) fn open(target: PoolTarget, options: StoreOptions) -> StorageResult<Self> {
        let busy_timeout = options.acquire_timeout;
        let wal = matches!(target, PoolTarget::File(_));
        let manager = match &target {
            PoolTarget::File(path) => SqliteConnectionManager::file(path),
            PoolTarget::Memory => SqliteConnectionManager::memory(),
        }
        .with_init(move |conn| configure(conn, busy_timeout, wal));

        let builder = Pool::builder()
            .connection_timeout(options.acquire_timeout)
            .min_idle(Some(1));
        let builder = match target {
            PoolTarget::File(_) => builder.max_size(options.max_connections.max(1) as u32),
            // The pool must never recycle the only copy of the data
            PoolTarget::Memory => builder.max_size(1).idle_timeout(None).max_lifetime(None),
        };
        let pool = builder
            .build(manager)
            .map_err(|e| acquire_failed(options.acquire_timeout, e))?;
        debug!(db = ?target, max = pool.max_size(), "connection pool ready");

        Ok(Self {
            options,
            inner: RwLock::new(Some(pool)),
        })
    }

    pub(super) fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Take a connection, waiting at most `acquire_timeout` for one to free up
    pub(super) fn checkout(&self) -> StorageResult<SqliteConnection> {
        let pool = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StorageError::Closed)?;
        pool.get()
            .map_err(|e| acquire_failed(self.options.acquire_timeout, e))
    }

    /// Refuse further checkouts. Idle connections close with the pool;
    /// connections still in use close when they are returned.
    pub(super) fn close(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn acquire_failed(after: Duration, err: r2d2::Error) -> StorageError {
    StorageError::AcquireTimeout {
        after,
        reason: err.to_string(),
    }
}

/// Per-connection setup, run by the pool on every new connection
fn configure(conn: &mut Connection, busy_timeout: Duration, wal: bool) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    if wal {
        // Readers outside a unit of work must not block on a writer
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    }
    Ok(())
}

//! Storage trait definitions

use crate::contact::{Contact, ContactId, LinkRole, NewContact};
use rusqlite::ErrorCode;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Store write lock not acquired: {0}")]
    Busy(rusqlite::Error),

    #[error("No store connection available after {after:?}: {reason}")]
    AcquireTimeout { after: Duration, reason: String },

    #[error("Unit of work exceeded its {0:?} budget")]
    UnitTimeout(Duration),

    #[error("Unit of work abandoned by its caller")]
    Abandoned,

    #[error("Store is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Invalid link role on contact {id}: {value}")]
    InvalidRole { id: i64, value: String },

    #[error("Invalid contact: {0}")]
    InvalidContact(&'static str),
}

impl StorageError {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Lock contention, timeouts and an unreachable store are transient;
    /// malformed rows and constraint failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Busy(_)
                | StorageError::AcquireTimeout { .. }
                | StorageError::UnitTimeout(_)
                | StorageError::Abandoned
                | StorageError::Closed
                | StorageError::Io(_)
        )
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                StorageError::Busy(err)
            }
            Some(ErrorCode::CannotOpen) => StorageError::Closed,
            _ => StorageError::Database(err),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Bounds applied to every unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long to wait for a pooled connection, and for the store-level
    /// write lock once a connection is held
    pub acquire_timeout: Duration,
    /// How long a unit of work may run before it is rolled back
    pub unit_timeout: Duration,
    /// Upper bound on open connections (in-memory stores always use one)
    pub max_connections: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(5),
            unit_timeout: Duration::from_secs(10),
            max_connections: 4,
        }
    }
}

/// Decides, exactly once, whether a unit of work may commit or its caller
/// has given up on it.
///
/// The unit claims the gate just before `COMMIT`; a caller that stops
/// waiting abandons it. Whichever happens first wins, so a caller that
/// abandoned the gate knows nothing was committed, and a caller that failed
/// to abandon it must wait for the unit's real outcome.
#[derive(Debug, Clone, Default)]
pub struct CommitGate(Arc<AtomicU8>);

const GATE_OPEN: u8 = 0;
const GATE_COMMITTING: u8 = 1;
const GATE_ABANDONED: u8 = 2;

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the right to commit. False once the gate was abandoned.
    pub fn claim_commit(&self) -> bool {
        self.0
            .compare_exchange(GATE_OPEN, GATE_COMMITTING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Give up on the unit. False if it already claimed its commit.
    pub fn abandon(&self) -> bool {
        self.0
            .compare_exchange(GATE_OPEN, GATE_ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::Acquire) == GATE_ABANDONED
    }
}

/// Transactional handle passed to a unit of work
///
/// Every read and write goes through the same isolated transaction, so the
/// work sees its own writes and nothing a concurrent unit has not committed.
pub trait ContactTx {
    /// Non-deleted contacts whose email or phone equals one of the given values
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> StorageResult<Vec<Contact>>;

    /// Non-deleted contacts whose id is a root, or whose link target is one.
    /// Ordered by id.
    fn find_cluster_by_root_ids(&self, ids: &[ContactId]) -> StorageResult<Vec<Contact>>;

    /// Insert a contact and return it as stored
    fn create_contact(&self, contact: &NewContact) -> StorageResult<Contact>;

    /// Set role and target on every listed non-deleted contact.
    /// Returns the number of rows changed.
    fn update_linkage(
        &self,
        ids: &[ContactId],
        role: LinkRole,
        target: Option<ContactId>,
    ) -> StorageResult<usize>;
}

/// Trait for contact storage backends
///
/// Implementations must be thread-safe (Send + Sync) so one store handle
/// can serve concurrent requests.
pub trait ContactStore: Send + Sync {
    /// Run `work` inside one atomic, isolated unit.
    ///
    /// Returning `Ok` commits; returning `Err` (or panicking) rolls back.
    /// Acquisition and total run time are bounded by the store's options;
    /// exceeding either surfaces as a transient `StorageError`.
    fn unit_of_work<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn ContactTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        self.unit_of_work_gated(None, work)
    }

    /// `unit_of_work` that commits only if it can claim `gate`. An abandoned
    /// gate makes the unit fail with `StorageError::Abandoned` at its next
    /// operation, and always before commit.
    fn unit_of_work_gated<T, E, F>(&self, gate: Option<&CommitGate>, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn ContactTx) -> Result<T, E>,
        E: From<StorageError>;

    /// Run read-only `work` against one consistent snapshot. Never takes the
    /// write lock and never commits; any write attempted is discarded.
    fn read_view<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn ContactTx) -> Result<T, E>,
        E: From<StorageError>;

    /// Lookup outside any unit of work. The answer may be stale by the time
    /// the caller acts on it.
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> StorageResult<Vec<Contact>>;

    /// Load a single non-deleted contact
    fn load_contact(&self, id: ContactId) -> StorageResult<Option<Contact>>;

    /// Number of non-deleted contacts
    fn count_contacts(&self) -> StorageResult<usize>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: ContactStore + Sized {
    /// Open or create a store at the given path with default options
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    /// Open or create a store at the given path
    fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

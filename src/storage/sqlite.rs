//! SQLite storage backend for contacts

use super::pool::{ConnectionPool, PoolTarget};
use super::traits::{
    CommitGate, ContactStore, ContactTx, OpenStore, StorageError, StorageResult, StoreOptions,
};
use crate::contact::{Contact, ContactId, LinkRole, NewContact};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const CONTACT_COLUMNS: &str =
    "id, email, phone_number, link_precedence, linked_id, created_at, updated_at, deleted_at";

/// Raw column values of one `contacts` row
type ContactRow = (
    i64,
    Option<String>,
    Option<String>,
    String,
    Option<i64>,
    String,
    String,
    Option<String>,
);

/// SQLite-backed contact store
///
/// Every unit of work runs in a `BEGIN IMMEDIATE` transaction, so units are
/// serialised on SQLite's write lock. Read views and plain reads use deferred
/// transactions and proceed alongside a writer under WAL.
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT,
                phone_number TEXT,
                link_precedence TEXT NOT NULL
                    CHECK (link_precedence IN ('primary', 'secondary')),
                linked_id INTEGER REFERENCES contacts(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_contacts_email ON contacts(email);
            CREATE INDEX IF NOT EXISTS idx_contacts_phone ON contacts(phone_number);
            CREATE INDEX IF NOT EXISTS idx_contacts_linked ON contacts(linked_id);
            "#,
        )?;
        Ok(())
    }

    fn from_pool(target: PoolTarget, options: StoreOptions) -> StorageResult<Self> {
        let pool = ConnectionPool::open(target, options)?;
        Self::init_schema(&*pool.checkout()?)?;
        debug!("contact store ready");
        Ok(Self { pool })
    }

    /// Release pooled connections. Later calls fail with `StorageError::Closed`.
    pub fn close(&self) {
        self.pool.close();
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(format!("{}: {}", raw, e)))
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContactRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

/// Deserialize a contact from database columns
fn row_to_contact(row: ContactRow) -> StorageResult<Contact> {
    let (id, email, phone, precedence, linked_id, created_at, updated_at, deleted_at) = row;
    let link_role = precedence
        .parse::<LinkRole>()
        .map_err(|_| StorageError::InvalidRole { id, value: precedence.clone() })?;

    Ok(Contact {
        id: ContactId::new(id),
        email,
        phone,
        link_role,
        link_target: linked_id.map(ContactId::new),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        deleted_at: deleted_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn query_contacts<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StorageResult<Vec<Contact>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, read_row)?;

    let mut contacts = Vec::new();
    for row in rows {
        contacts.push(row_to_contact(row?)?);
    }
    Ok(contacts)
}

fn select_by_email_or_phone(
    conn: &Connection,
    email: Option<&str>,
    phone: Option<&str>,
) -> StorageResult<Vec<Contact>> {
    if email.is_none() && phone.is_none() {
        return Ok(Vec::new());
    }
    // A NULL parameter never compares equal, so an absent fact matches nothing
    let sql = format!(
        "SELECT {} FROM contacts
         WHERE deleted_at IS NULL AND (email = ?1 OR phone_number = ?2)
         ORDER BY id",
        CONTACT_COLUMNS
    );
    query_contacts(conn, &sql, params![email, phone])
}

fn select_cluster(conn: &Connection, roots: &[ContactId]) -> StorageResult<Vec<Contact>> {
    if roots.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = (1..=roots.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {} FROM contacts
         WHERE deleted_at IS NULL AND (id IN ({p}) OR linked_id IN ({p}))
         ORDER BY id",
        CONTACT_COLUMNS,
        p = placeholders
    );
    query_contacts(conn, &sql, params_from_iter(roots.iter().map(|id| id.as_i64())))
}

fn insert_contact(conn: &Connection, contact: &NewContact) -> StorageResult<Contact> {
    if contact.email.is_none() && contact.phone.is_none() {
        return Err(StorageError::InvalidContact("contact needs an email or a phone"));
    }
    match (contact.link_role, contact.link_target) {
        (LinkRole::Representative, Some(_)) => {
            return Err(StorageError::InvalidContact("representative cannot have a link target"))
        }
        (LinkRole::Member, None) => {
            return Err(StorageError::InvalidContact("member needs a link target"))
        }
        _ => {}
    }

    let now = Utc::now().trunc_subsecs(6);
    let stamp = format_timestamp(&now);
    conn.execute(
        "INSERT INTO contacts (email, phone_number, link_precedence, linked_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            contact.email,
            contact.phone,
            contact.link_role.as_str(),
            contact.link_target.map(|id| id.as_i64()),
            stamp,
        ],
    )?;

    Ok(Contact {
        id: ContactId::new(conn.last_insert_rowid()),
        email: contact.email.clone(),
        phone: contact.phone.clone(),
        link_role: contact.link_role,
        link_target: contact.link_target,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

fn set_linkage(
    conn: &Connection,
    ids: &[ContactId],
    role: LinkRole,
    target: Option<ContactId>,
) -> StorageResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = (4..ids.len() + 4)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE contacts SET link_precedence = ?1, linked_id = ?2, updated_at = ?3
         WHERE deleted_at IS NULL AND id IN ({})",
        placeholders
    );

    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![
        Box::new(role.as_str()),
        Box::new(target.map(|id| id.as_i64())),
        Box::new(format_timestamp(&Utc::now().trunc_subsecs(6))),
    ];
    params_vec.extend(ids.iter().map(|id| Box::new(id.as_i64()) as Box<dyn rusqlite::ToSql>));
    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();

    Ok(conn.execute(&sql, params_refs.as_slice())?)
}

/// One open transaction with a run-time budget and an optional commit gate
struct SqliteUnit<'c, 'g> {
    tx: Transaction<'c>,
    deadline: Instant,
    budget: Duration,
    gate: Option<&'g CommitGate>,
}

impl SqliteUnit<'_, '_> {
    fn check_deadline(&self) -> StorageResult<()> {
        if self.gate.map_or(false, CommitGate::is_abandoned) {
            return Err(StorageError::Abandoned);
        }
        if Instant::now() > self.deadline {
            return Err(StorageError::UnitTimeout(self.budget));
        }
        Ok(())
    }

    /// Commit, unless the budget ran out or the caller gave up, in which
    /// case roll back
    fn finish(self) -> StorageResult<()> {
        let refused = match self.check_deadline() {
            Err(err) => Some(err),
            Ok(()) if !self.gate.map_or(true, CommitGate::claim_commit) => {
                Some(StorageError::Abandoned)
            }
            Ok(()) => None,
        };
        if let Some(err) = refused {
            self.tx.rollback()?;
            return Err(err);
        }
        self.tx.commit()?;
        Ok(())
    }

    fn abort(self) {
        if let Err(rollback_err) = self.tx.rollback() {
            warn!(error = %rollback_err, "rollback failed; connection drop will discard the transaction");
        }
    }
}

impl ContactTx for SqliteUnit<'_, '_> {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> StorageResult<Vec<Contact>> {
        self.check_deadline()?;
        select_by_email_or_phone(&self.tx, email, phone)
    }

    fn find_cluster_by_root_ids(&self, ids: &[ContactId]) -> StorageResult<Vec<Contact>> {
        self.check_deadline()?;
        select_cluster(&self.tx, ids)
    }

    fn create_contact(&self, contact: &NewContact) -> StorageResult<Contact> {
        self.check_deadline()?;
        insert_contact(&self.tx, contact)
    }

    fn update_linkage(
        &self,
        ids: &[ContactId],
        role: LinkRole,
        target: Option<ContactId>,
    ) -> StorageResult<usize> {
        self.check_deadline()?;
        set_linkage(&self.tx, ids, role, target)
    }
}

impl OpenStore for SqliteStore {
    fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_pool(PoolTarget::File(path.as_ref().to_path_buf()), options)
    }

    fn open_in_memory() -> StorageResult<Self> {
        Self::from_pool(PoolTarget::Memory, StoreOptions::default())
    }
}

impl SqliteStore {
    /// In-memory store with explicit bounds
    pub fn open_in_memory_with(options: StoreOptions) -> StorageResult<Self> {
        Self::from_pool(PoolTarget::Memory, options)
    }

    fn run_unit<T, E, F>(
        &self,
        behavior: TransactionBehavior,
        gate: Option<&CommitGate>,
        commit: bool,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&dyn ContactTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut conn = self.pool.checkout()?;
        let tx = conn
            .transaction_with_behavior(behavior)
            .map_err(StorageError::from)?;
        let budget = self.pool.options().unit_timeout;
        let unit = SqliteUnit {
            tx,
            deadline: Instant::now() + budget,
            budget,
            gate,
        };

        match work(&unit) {
            Ok(value) if !commit => {
                unit.abort();
                Ok(value)
            }
            Ok(value) => {
                unit.finish()?;
                Ok(value)
            }
            Err(err) => {
                unit.abort();
                Err(err)
            }
        }
    }
}

impl ContactStore for SqliteStore {
    fn unit_of_work_gated<T, E, F>(&self, gate: Option<&CommitGate>, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn ContactTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        self.run_unit(TransactionBehavior::Immediate, gate, true, work)
    }

    fn read_view<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn ContactTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        self.run_unit(TransactionBehavior::Deferred, None, false, work)
    }

    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> StorageResult<Vec<Contact>> {
        let conn = self.pool.checkout()?;
        select_by_email_or_phone(&conn, email, phone)
    }

    fn load_contact(&self, id: ContactId) -> StorageResult<Option<Contact>> {
        let conn = self.pool.checkout()?;
        let sql = format!(
            "SELECT {} FROM contacts WHERE id = ?1 AND deleted_at IS NULL",
            CONTACT_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![id.as_i64()], read_row)
            .optional()?;
        row.map(row_to_contact).transpose()
    }

    fn count_contacts(&self) -> StorageResult<usize> {
        let conn = self.pool.checkout()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM contacts WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

//! Pool Store - durable home of plans, grants, exercises and the ledger rows
//! they move.
//!
//! Every mutation goes through [`PoolStore::write`], which opens a
//! `BEGIN IMMEDIATE` transaction: the database write lock is held from the
//! first read, so aggregate checks (pool availability) and the writes that
//! depend on them cannot interleave with another writer, even across
//! processes sharing the file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, TransactionBehavior};

use crate::sqlite_util::open_secure_db;

/// Read-only view handed to [`PoolStore::read`] closures.
pub struct Reader<'conn> {
    pub(crate) conn: &'conn Connection,
}

/// Read-write view handed to [`PoolStore::write`] closures. Everything done
/// through it commits together or not at all.
pub struct UnitOfWork<'conn> {
    reader: Reader<'conn>,
}

impl<'conn> UnitOfWork<'conn> {
    pub(crate) fn conn(&self) -> &'conn Connection {
        self.reader.conn
    }
}

impl<'conn> std::ops::Deref for UnitOfWork<'conn> {
    type Target = Reader<'conn>;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

pub struct PoolStore {
    db: Mutex<Connection>,
}

impl PoolStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS companies (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            status TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS share_classes (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id),
            name TEXT NOT NULL,
            total_issued TEXT NOT NULL DEFAULT '0'
        );

        CREATE TABLE IF NOT EXISTS shareholders (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id),
            name TEXT NOT NULL,
            user_id TEXT
        );

        CREATE TABLE IF NOT EXISTS company_members (
            company_id TEXT NOT NULL REFERENCES companies(id),
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            PRIMARY KEY (company_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS holdings (
            shareholder_id TEXT NOT NULL REFERENCES shareholders(id),
            share_class_id TEXT NOT NULL REFERENCES share_classes(id),
            quantity TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (shareholder_id, share_class_id)
        );

        CREATE TABLE IF NOT EXISTS option_plans (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id),
            share_class_id TEXT NOT NULL REFERENCES share_classes(id),
            name TEXT NOT NULL,
            total_pool_size TEXT NOT NULL,
            total_granted TEXT NOT NULL,
            total_exercised TEXT NOT NULL,
            status TEXT NOT NULL,
            termination_policy TEXT NOT NULL,
            exercise_window_days INTEGER NOT NULL,
            board_approval_date TEXT,
            created_at TEXT NOT NULL,
            closed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS option_grants (
            id TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL REFERENCES option_plans(id),
            shareholder_id TEXT REFERENCES shareholders(id),
            employee_name TEXT NOT NULL,
            employee_email TEXT NOT NULL,
            quantity TEXT NOT NULL,
            strike_price TEXT NOT NULL,
            exercised TEXT NOT NULL,
            status TEXT NOT NULL,
            grant_date TEXT NOT NULL,
            expiration_date TEXT NOT NULL,
            cliff_months INTEGER NOT NULL,
            vesting_duration_months INTEGER NOT NULL,
            vesting_frequency TEXT NOT NULL,
            cliff_percentage TEXT NOT NULL,
            acceleration_on_coc INTEGER NOT NULL,
            terminated_at TEXT,
            vested_at_termination TEXT,
            created_at TEXT NOT NULL,
            CHECK (cliff_months <= vesting_duration_months)
        );

        CREATE TABLE IF NOT EXISTS option_exercises (
            id TEXT PRIMARY KEY,
            grant_id TEXT NOT NULL REFERENCES option_grants(id),
            quantity TEXT NOT NULL,
            total_cost TEXT NOT NULL,
            payment_reference TEXT NOT NULL,
            status TEXT NOT NULL,
            requested_by TEXT NOT NULL,
            confirmed_by TEXT,
            confirmed_at TEXT,
            cancelled_at TEXT,
            created_at TEXT NOT NULL
        );

        -- At most one exercise awaiting payment per grant
        CREATE UNIQUE INDEX IF NOT EXISTS idx_option_exercises_one_pending
        ON option_exercises(grant_id) WHERE status = 'PENDING_PAYMENT';

        CREATE UNIQUE INDEX IF NOT EXISTS idx_option_exercises_payment_reference
        ON option_exercises(payment_reference);

        CREATE INDEX IF NOT EXISTS idx_option_exercises_grant
        ON option_exercises(grant_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_option_grants_plan
        ON option_grants(plan_id, status);

        CREATE INDEX IF NOT EXISTS idx_option_grants_expiry
        ON option_grants(status, expiration_date);

        CREATE INDEX IF NOT EXISTS idx_option_plans_company
        ON option_plans(company_id);
    ";

    /// Open or create the pool database at the given path.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let db = open_secure_db(path)?;
        db.busy_timeout(busy_timeout)
            .context("Failed to set pool store busy timeout")?;
        let store = Self::initialize(db)?;
        tracing::debug!(path = %path.display(), "Opened pool store");
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory pool store")?;
        Self::initialize(db)
    }

    fn initialize(db: Connection) -> Result<Self> {
        db.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;",
        )
        .context("Failed to set pool store pragmas")?;
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create pool store schema")?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow!("pool store connection lock poisoned"))
    }

    /// Run `f` against a consistent read snapshot.
    pub fn read<T>(&self, f: impl FnOnce(&Reader<'_>) -> Result<T>) -> Result<T> {
        let mut db = self.lock()?;
        let tx = db
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .context("Failed to begin read transaction")?;
        f(&Reader { conn: &tx })
    }

    /// Run `f` as one atomic unit of work.
    ///
    /// `f`'s error aborts the transaction; nothing it wrote survives.
    pub fn write<T, E>(&self, f: impl FnOnce(&UnitOfWork<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<anyhow::Error>,
    {
        let mut db = self.lock()?;
        let tx = db
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin unit of work")?;
        let out = f(&UnitOfWork {
            reader: Reader { conn: &tx },
        })?;
        tx.commit().context("Failed to commit unit of work")?;
        Ok(out)
    }
}

//! Fleet Store - SQLite-backed record store for robots and missions
//!
//! # Architecture
//!
//! One `FleetStore` wraps one SQLite connection. Worker processes and
//! scheduler jobs each open their own connection to the same database file.
//!
//! # Guarantees
//!
//! - WAL journal: readers see committed snapshots while a writer is active
//! - Every `FleetTransaction` is `BEGIN IMMEDIATE`, so writers are serialized
//!   and a transaction never observes another writer's uncommitted rows
//! - Dropping a `FleetTransaction` without `commit()` rolls back everything
//! - Nested savepoints let a reconciler discard one record's writes while
//!   keeping the rest of the pass

use chrono::{DateTime, TimeZone, Utc};
use robofleet_core::StoreConfig;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{RegistryError, Result};

/// A row that could not be decoded during a scan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedRow {
    /// Raw id column
    pub id: String,
    /// Why decoding failed
    pub reason: String,
}

/// Result of a filtered scan
#[derive(Debug, Clone)]
pub struct Scan<T> {
    /// Decoded records in scan order
    pub records: Vec<T>,
    /// Rows that failed to decode, excluded from `records`
    pub skipped: Vec<SkippedRow>,
}

impl<T> Scan<T> {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Store handle owning one SQLite connection
pub struct FleetStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl FleetStore {
    /// Open the store described by `config`
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Self::open_path(&config.path, config.busy_timeout())
    }

    /// Create or open a store at the specified path
    pub fn open_path(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();

        info!(path = %path.display(), "Opening fleet store");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(busy_timeout)?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory store, used by tests and one-shot tools
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS robots (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                serial_number TEXT NOT NULL UNIQUE,
                robot_type TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                position_x REAL,
                position_y REAL,
                position_z REAL,
                heading REAL,
                battery_level REAL,
                firmware_version TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_robots_status ON robots(status);

            CREATE TABLE IF NOT EXISTS missions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                priority TEXT NOT NULL,
                status TEXT NOT NULL,
                progress REAL NOT NULL DEFAULT 0,
                target_x REAL,
                target_y REAL,
                target_z REAL,
                robot_id TEXT,
                scheduled_at INTEGER,
                started_at INTEGER,
                completed_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_missions_status ON missions(status);
            CREATE INDEX IF NOT EXISTS idx_missions_scheduled ON missions(scheduled_at);
            CREATE INDEX IF NOT EXISTS idx_missions_robot ON missions(robot_id);
            "#,
        )?;

        Ok(())
    }

    /// Begin a write transaction stamped with the current time
    pub fn begin(&mut self) -> Result<FleetTransaction<'_>> {
        self.begin_at(Utc::now())
    }

    /// Begin a write transaction whose logical clock is `now`
    pub fn begin_at(&mut self, now: DateTime<Utc>) -> Result<FleetTransaction<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(FleetTransaction { tx, now })
    }

    /// Run `f` in one transaction, committing only if it succeeds
    pub fn write<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&FleetTransaction<'_>) -> std::result::Result<T, E>,
        E: From<RegistryError>,
    {
        let tx = self.begin()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Execute raw SQL for testing purposes only
    ///
    /// **WARNING**: bypasses the transition tables. Tests use it to plant
    /// corrupt rows.
    #[doc(hidden)]
    pub fn __test_execute_raw_sql(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<usize> {
        Ok(self.conn.execute(sql, params)?)
    }
}

/// One transactional scope over both registries
///
/// All writes made through it carry the same `now` as `updated_at`.
pub struct FleetTransaction<'conn> {
    pub(crate) tx: Transaction<'conn>,
    now: DateTime<Utc>,
}

impl<'conn> FleetTransaction<'conn> {
    /// Logical time of this scope
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.tx
    }

    pub(crate) fn now_ms(&self) -> i64 {
        to_millis(self.now)
    }

    /// Run `f` inside a savepoint; its writes are discarded if it fails
    pub fn savepoint<T, E, F>(&self, name: &str, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<RegistryError>,
    {
        self.tx
            .execute_batch(&format!("SAVEPOINT {name}"))
            .map_err(RegistryError::from)?;

        match f(self) {
            Ok(value) => {
                self.tx
                    .execute_batch(&format!("RELEASE {name}"))
                    .map_err(RegistryError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self
                    .tx
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
                {
                    error!(savepoint = name, error = %rollback_err, "Savepoint rollback failed");
                    return Err(RegistryError::from(rollback_err).into());
                }
                debug!(savepoint = name, "Savepoint rolled back");
                Err(err)
            }
        }
    }

    /// Commit all writes made in this scope
    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    /// Discard all writes made in this scope
    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> std::result::Result<DateTime<Utc>, String> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| format!("timestamp {ms} out of range"))
}

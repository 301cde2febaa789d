//! SQLite-backed datastore for rooms, members, availability, meetings, notes
//! and sessions.
//!
//! The database lives at `~/.schedulemate/schedulemate.db` unless the config
//! points elsewhere. A `ScheduleDb` owns one connection; callers that share it
//! across tasks wrap it in a lock (see `state::AppState`).

use std::path::{Path, PathBuf};

use rusqlite::Connection;

pub mod types;
pub use types::*;

pub struct ScheduleDb {
    conn: Connection,
}

impl ScheduleDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(DbError::from)?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT").map_err(DbError::from)?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default path and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        Self::init(conn)
    }

    /// Open a private in-memory database. Nothing survives the handle.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        // WAL for concurrent readers; in-memory databases silently keep "memory".
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.schedulemate/schedulemate.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".schedulemate").join("schedulemate.db"))
    }

    /// Resolve the configured path, falling back to the default.
    pub fn resolve_path(configured: Option<&str>) -> Result<PathBuf, DbError> {
        match configured.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Ok(Path::new(p).to_path_buf()),
            None => Self::default_path(),
        }
    }
}

pub mod availability;
pub mod meetings;
pub mod notes;
pub mod rooms;
pub mod sessions;
pub mod users;

// =============================================================================
// Shared test utilities
// =============================================================================

//! Database connection management

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::migrations;

/// Database wrapper for `SQLite` connections
///
/// A single connection guarded by a mutex serializes every queue, conflict,
/// and record transition, which is what makes each state change atomic with
/// respect to all the others. Individual statements are fast local writes, so
/// callers on the capture path never wait on network I/O here.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        configure(&conn)?;
        migrations::run(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        configure(&conn)?;
        migrations::run(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get exclusive access to the underlying connection
    ///
    /// A poisoned lock is recovered rather than propagated: `SQLite` state is
    /// consistent statement by statement, and the queue must stay usable
    /// after a panicked worker.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Configure `SQLite` for a local-first workload
fn configure(conn: &Connection) -> Result<()> {
    // WAL keeps readers unblocked while the driver writes
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.pragma_update(None, "synchronous", "NORMAL").ok();
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "cache_size", 10_000).ok();
    Ok(())
}

//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|flag| flag != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: operation queue
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Durable operation queue. `seq` is the enqueue order authority:
        // AUTOINCREMENT stays monotonic across deletes, so FIFO per resource
        // holds even when several operations land in the same millisecond.
        "CREATE TABLE IF NOT EXISTS operations (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            op_type TEXT NOT NULL,
            data_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            enqueued_at INTEGER NOT NULL,
            not_before INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_operations_status ON operations(status)",
        "CREATE INDEX IF NOT EXISTS idx_operations_resource ON operations(resource_id, status, seq)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    apply(conn, &statements)?;
    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: conflict ledger and local record cache
fn migrate_v2(conn: &mut Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS conflicts (
            id TEXT PRIMARY KEY,
            resource_id TEXT NOT NULL,
            data_type TEXT NOT NULL,
            client_version TEXT NOT NULL,
            server_version TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            detected_at INTEGER NOT NULL,
            resolved_at INTEGER,
            resolved_payload TEXT
        )",
        // At most one open conflict per resource
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_conflicts_open_resource
         ON conflicts(resource_id) WHERE status = 'open'",
        "CREATE INDEX IF NOT EXISTS idx_conflicts_status ON conflicts(status, detected_at DESC)",
        // Latest known snapshot per resource, refreshed on delivery and
        // on conflict resolution
        "CREATE TABLE IF NOT EXISTS records (
            data_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (data_type, resource_id)
        )",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

    apply(conn, &statements)?;
    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

/// Apply a migration's statements inside one transaction
fn apply(conn: &mut Connection, statements: &[&str]) -> Result<()> {
    let tx = conn.transaction()?;
    for statement in statements {
        tx.execute(statement, [])?;
    }
    tx.commit()?;
    Ok(())
}

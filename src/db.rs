// 🗄️ Storage - SQLite schema and transaction scope
// Three tables: accounts, loads (source of truth), events (derived cache).

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::Result;

/// Open the database file and apply connection settings.
pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn, busy_timeout)?;
    debug!(path = %path.display(), "opened database");
    Ok(conn)
}

/// Open an in-memory database (tests and dry runs)
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn, Duration::from_secs(0))?;
    Ok(conn)
}

fn configure(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// Run `f` inside one write transaction.
///
/// Commits only when `f` returns Ok. Any error (or panic) drops the
/// transaction, which rolls everything back. `BEGIN IMMEDIATE` takes the
/// write lock up front, so concurrent writers are serialized instead of
/// interleaving their reads and writes.
pub fn in_transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

/// Create the schema. Safe to call on an existing database.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // ==========================================================================
    // Accounts
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS twitter_account (
            id INTEGER PRIMARY KEY,
            screen_name TEXT NOT NULL,
            added_dt TEXT NOT NULL,
            updated_dt TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Loads (immutable snapshots)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS relationship_load (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES twitter_account(id),
            followers TEXT NOT NULL,
            friends TEXT NOT NULL,
            added_dt TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events (derived from adjacent loads, regenerated on invalidation)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS relationship_event (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES twitter_account(id),
            subject_id INTEGER NOT NULL,
            verb TEXT NOT NULL CHECK (verb IN ('follow', 'unfollow')),
            object_id INTEGER NOT NULL,
            event_start_dt TEXT NOT NULL,
            event_end_dt TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_account_screen_name ON twitter_account(screen_name)",
        [],
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_load_account_time
         ON relationship_load(account_id, added_dt)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_event_account_interval
         ON relationship_event(account_id, event_start_dt, event_end_dt)",
        [],
    )?;

    info!("schema initialized");
    Ok(())
}

/// Destroy the schema and every row in it.
pub fn reset_schema(conn: &Connection) -> Result<()> {
    conn.execute("DROP TABLE IF EXISTS relationship_event", [])?;
    conn.execute("DROP TABLE IF EXISTS relationship_load", [])?;
    conn.execute("DROP TABLE IF EXISTS twitter_account", [])?;

    info!("schema dropped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TwackError;

    fn table_count(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
             AND name IN ('twitter_account', 'relationship_load', 'relationship_event')",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();

        assert_eq!(table_count(&conn), 3);
    }

    #[test]
    fn test_reset_drops_everything() {
        let conn = open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        reset_schema(&conn).unwrap();

        assert_eq!(table_count(&conn), 0);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let mut conn = open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let result: Result<()> = in_transaction(&mut conn, |tx| {
            tx.execute(
                "INSERT INTO twitter_account (id, screen_name, added_dt, updated_dt)
                 VALUES (1, 'someone', 'x', 'x')",
                [],
            )?;
            Err(TwackError::Api("boom".to_string()))
        });

        assert!(result.is_err());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM twitter_account", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}

//! Connection setup for the kv database.
//!
//! # Invariants
//! - Returned connections are fully migrated.
//! - File databases run in WAL mode so grant flushes do not block readers.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) the kv database at `path`.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    prepare("file", Connection::open(path), true)
}

/// Opens a private in-memory kv database.
pub fn open_db_in_memory() -> DbResult<Connection> {
    prepare("memory", Connection::open_in_memory(), false)
}

fn prepare(
    mode: &'static str,
    connected: rusqlite::Result<Connection>,
    wal: bool,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    let result = connected
        .map_err(DbError::from)
        .and_then(|mut conn| -> DbResult<(Connection, usize)> {
            if wal {
                conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
            }
            conn.busy_timeout(BUSY_TIMEOUT)?;
            let applied = apply_migrations(&mut conn)?;
            Ok((conn, applied))
        });

    match result {
        Ok((conn, applied)) => {
            info!(
                "event=db_open module=db status=ok mode={} migrations_applied={} duration_ms={}",
                mode,
                applied,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

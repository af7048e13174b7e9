//! Ordered schema steps for the kv database.
//!
//! Each step runs in its own transaction together with the matching
//! `user_version` bump, so an interrupted upgrade resumes at the failed step.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;

struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "kv_entries",
        sql: include_str!("0001_kv_entries.sql"),
    },
    Step {
        version: 2,
        name: "kv_updated_at",
        sql: include_str!("0002_kv_updated_at.sql"),
    },
];

/// Schema level this build writes.
pub fn latest_version() -> u32 {
    STEPS.iter().map(|step| step.version).max().unwrap_or(0)
}

/// Brings `conn` up to [`latest_version`].
///
/// Returns the number of steps applied.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let found: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let supported = latest_version();
    if found > supported {
        return Err(DbError::SchemaTooNew { found, supported });
    }

    let mut applied = 0;
    for step in STEPS.iter().filter(|step| step.version > found) {
        run_step(conn, step).map_err(|source| {
            error!(
                "event=db_migrate module=db status=error version={} name={} error={}",
                step.version, step.name, source
            );
            DbError::Migration {
                version: step.version,
                name: step.name,
                source,
            }
        })?;
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            step.version, step.name
        );
        applied += 1;
    }
    Ok(applied)
}

fn run_step(conn: &mut Connection, step: &Step) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(step.sql)?;
    tx.pragma_update(None, "user_version", step.version)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, latest_version, STEPS};
    use rusqlite::Connection;

    #[test]
    fn steps_are_strictly_increasing() {
        assert!(STEPS.windows(2).all(|pair| pair[0].version < pair[1].version));
    }

    #[test]
    fn second_run_applies_nothing() {
        let mut conn = Connection::open_in_memory().expect("raw connection");
        assert_eq!(
            apply_migrations(&mut conn).expect("first run"),
            latest_version() as usize
        );
        assert_eq!(apply_migrations(&mut conn).expect("second run"), 0);
    }
}

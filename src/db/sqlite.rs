use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use super::DatabaseError;

/// Schema migrations, applied in order. Each script records its own version
/// in `schema_version`.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../resources/migrations/001_initial.sql"))];

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the bank database at `path`, creating and migrating it as needed.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    prepare(Connection::open(path)?)
}

/// In-memory bank with the full schema, for tests and dry runs.
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection, DatabaseError> {
    // Handlers open one connection per request; WAL plus a busy timeout lets them overlap.
    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Apply every migration newer than the stored schema version.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let applied = schema_version(conn);
    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > applied) {
        tracing::info!(version, "Applying bank schema migration");
        conn.execute_batch(sql)
            .map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

/// Highest applied migration; 0 on a fresh database.
pub fn schema_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .unwrap_or(0)
}

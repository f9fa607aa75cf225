use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// Current question-bank snapshot id.
pub fn current_snapshot(conn: &Connection) -> Result<i64, DatabaseError> {
    let id = conn.query_row("SELECT snapshot_id FROM bank_meta WHERE id = 1", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(id)
}

/// Advance the snapshot id. Call inside the transaction that changes the bank.
pub fn bump_snapshot(conn: &Connection) -> Result<i64, DatabaseError> {
    conn.execute(
        "UPDATE bank_meta SET snapshot_id = snapshot_id + 1 WHERE id = ?1",
        params![1],
    )?;
    current_snapshot(conn)
}

use rusqlite::{params, Connection};

use super::format_timestamp;
use crate::db::DatabaseError;
use crate::models::Blueprint;

/// Persist a computed blueprint. Recomputing the same snapshot overwrites it.
pub fn save_blueprint(conn: &Connection, blueprint: &Blueprint) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO blueprints (exam_name, subject, snapshot_id, body, computed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            blueprint.exam_name,
            blueprint.subject,
            blueprint.snapshot_id,
            serde_json::to_string(blueprint)?,
            format_timestamp(&blueprint.computed_at),
        ],
    )?;
    Ok(())
}

pub fn get_blueprint(
    conn: &Connection,
    exam_name: &str,
    subject: &str,
    snapshot_id: i64,
) -> Result<Option<Blueprint>, DatabaseError> {
    let result = conn.query_row(
        "SELECT body FROM blueprints WHERE exam_name = ?1 AND subject = ?2 AND snapshot_id = ?3",
        params![exam_name, subject, snapshot_id],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

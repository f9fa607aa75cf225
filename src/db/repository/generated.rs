use rusqlite::{params, Connection};
use uuid::Uuid;

use super::format_timestamp;
use crate::db::DatabaseError;
use crate::models::GeneratedPaper;

pub fn insert_generated(conn: &Connection, paper: &GeneratedPaper) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO generated_papers (generated_id, exam_name, subject, snapshot_id, body,
         generated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            paper.generated_id.to_string(),
            paper.exam_name,
            paper.subject,
            paper.snapshot_id,
            serde_json::to_string(paper)?,
            format_timestamp(&paper.generated_at),
        ],
    )?;
    Ok(())
}

pub fn get_generated(conn: &Connection, id: &Uuid) -> Result<Option<GeneratedPaper>, DatabaseError> {
    let result = conn.query_row(
        "SELECT body FROM generated_papers WHERE generated_id = ?1",
        params![id.to_string()],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Generated papers built against one bank snapshot, oldest first.
pub fn list_generated(
    conn: &Connection,
    exam_name: &str,
    subject: &str,
    snapshot_id: i64,
) -> Result<Vec<GeneratedPaper>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT body FROM generated_papers
         WHERE exam_name = ?1 AND subject = ?2 AND snapshot_id = ?3
         ORDER BY generated_at",
    )?;
    let rows = stmt.query_map(params![exam_name, subject, snapshot_id], |row| {
        row.get::<_, String>(0)
    })?;

    let mut papers = Vec::new();
    for body in rows {
        papers.push(serde_json::from_str(&body?)?);
    }
    Ok(papers)
}

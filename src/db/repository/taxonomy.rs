use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::format_timestamp;
use crate::db::DatabaseError;
use crate::models::{ChapterEntry, ChapterTaxonomy};

pub fn upsert_taxonomy(
    conn: &Connection,
    taxonomy: &ChapterTaxonomy,
    now: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO chapter_taxonomies (subject, chapters, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (subject) DO UPDATE SET chapters = excluded.chapters,
         updated_at = excluded.updated_at",
        params![
            taxonomy.subject,
            serde_json::to_string(&taxonomy.chapters)?,
            format_timestamp(now),
        ],
    )?;
    Ok(())
}

pub fn get_taxonomy(conn: &Connection, subject: &str) -> Result<Option<ChapterTaxonomy>, DatabaseError> {
    let result = conn.query_row(
        "SELECT chapters FROM chapter_taxonomies WHERE subject = ?1",
        params![subject],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(raw) => {
            let chapters: Vec<ChapterEntry> = serde_json::from_str(&raw)?;
            Ok(Some(ChapterTaxonomy {
                subject: subject.to_string(),
                chapters,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

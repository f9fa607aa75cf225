use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::PaperStatus;
use crate::models::SourcePaper;

const PAPER_COLUMNS: &str = "paper_id, exam_name, subject, year, blob_ref, original_filename,
     status, version, degraded, failure_reason, failed_pages, uploaded_at, updated_at";

struct PaperRow {
    paper_id: String,
    exam_name: String,
    subject: String,
    year: i32,
    blob_ref: String,
    original_filename: Option<String>,
    status: String,
    version: i64,
    degraded: i32,
    failure_reason: Option<String>,
    failed_pages: String,
    uploaded_at: String,
    updated_at: String,
}

fn read_paper_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaperRow> {
    Ok(PaperRow {
        paper_id: row.get(0)?,
        exam_name: row.get(1)?,
        subject: row.get(2)?,
        year: row.get(3)?,
        blob_ref: row.get(4)?,
        original_filename: row.get(5)?,
        status: row.get(6)?,
        version: row.get(7)?,
        degraded: row.get(8)?,
        failure_reason: row.get(9)?,
        failed_pages: row.get(10)?,
        uploaded_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn paper_from_row(row: PaperRow) -> Result<SourcePaper, DatabaseError> {
    Ok(SourcePaper {
        paper_id: parse_uuid(&row.paper_id, "SourcePaper")?,
        exam_name: row.exam_name,
        subject: row.subject,
        year: row.year,
        blob_ref: row.blob_ref,
        original_filename: row.original_filename,
        status: PaperStatus::from_str(&row.status)?,
        version: row.version,
        degraded: row.degraded != 0,
        failure_reason: row.failure_reason,
        failed_pages: serde_json::from_str(&row.failed_pages).unwrap_or_default(),
        uploaded_at: parse_timestamp(&row.uploaded_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}

pub fn insert_paper(conn: &Connection, paper: &SourcePaper) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO source_papers (paper_id, exam_name, subject, year, blob_ref, original_filename,
         status, version, degraded, failure_reason, failed_pages, uploaded_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            paper.paper_id.to_string(),
            paper.exam_name,
            paper.subject,
            paper.year,
            paper.blob_ref,
            paper.original_filename,
            paper.status.as_str(),
            paper.version,
            paper.degraded as i32,
            paper.failure_reason,
            serde_json::to_string(&paper.failed_pages)?,
            format_timestamp(&paper.uploaded_at),
            format_timestamp(&paper.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_paper(conn: &Connection, id: &Uuid) -> Result<Option<SourcePaper>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAPER_COLUMNS} FROM source_papers WHERE paper_id = ?1"
    ))?;

    let result = stmt.query_row(params![id.to_string()], read_paper_row);

    match result {
        Ok(row) => Ok(Some(paper_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Papers of one exam/subject, oldest year first.
pub fn list_papers(
    conn: &Connection,
    exam_name: &str,
    subject: &str,
    status: Option<PaperStatus>,
) -> Result<Vec<SourcePaper>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAPER_COLUMNS} FROM source_papers
         WHERE exam_name = ?1 AND subject = ?2 AND (?3 IS NULL OR status = ?3)
         ORDER BY year, uploaded_at"
    ))?;

    let rows = stmt.query_map(
        params![exam_name, subject, status.map(|s| s.as_str())],
        read_paper_row,
    )?;

    let mut papers = Vec::new();
    for row in rows {
        papers.push(paper_from_row(row?)?);
    }
    Ok(papers)
}

/// Move a paper into EXTRACTING for a new ingestion attempt and return its version.
///
/// The first attempt after upload keeps version 1; every later attempt bumps it.
pub fn begin_ingest_attempt(
    conn: &Connection,
    id: &Uuid,
    now: &DateTime<Utc>,
) -> Result<i64, DatabaseError> {
    let rows = conn.execute(
        "UPDATE source_papers SET
            version = CASE WHEN status = 'UPLOADED' THEN version ELSE version + 1 END,
            status = 'EXTRACTING', degraded = 0, failure_reason = NULL,
            failed_pages = '[]', updated_at = ?2
         WHERE paper_id = ?1",
        params![id.to_string(), format_timestamp(now)],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "SourcePaper".into(),
            id: id.to_string(),
        });
    }
    let version = conn.query_row(
        "SELECT version FROM source_papers WHERE paper_id = ?1",
        params![id.to_string()],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(version)
}

/// Record the end of extraction, including pages that fell back to a placeholder.
pub fn mark_paper_extracted(
    conn: &Connection,
    id: &Uuid,
    degraded: bool,
    failed_pages: &[u32],
    now: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    update_paper(
        conn,
        id,
        "UPDATE source_papers SET status = 'EXTRACTED', degraded = ?2, failed_pages = ?3,
         updated_at = ?4 WHERE paper_id = ?1",
        params![
            id.to_string(),
            degraded as i32,
            serde_json::to_string(failed_pages)?,
            format_timestamp(now)
        ],
    )
}

pub fn mark_paper_ingested(
    conn: &Connection,
    id: &Uuid,
    now: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    update_paper(
        conn,
        id,
        "UPDATE source_papers SET status = 'INGESTED', updated_at = ?2 WHERE paper_id = ?1",
        params![id.to_string(), format_timestamp(now)],
    )
}

pub fn mark_paper_failed(
    conn: &Connection,
    id: &Uuid,
    reason: &str,
    now: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    update_paper(
        conn,
        id,
        "UPDATE source_papers SET status = 'FAILED', failure_reason = ?2, updated_at = ?3
         WHERE paper_id = ?1",
        params![id.to_string(), reason, format_timestamp(now)],
    )
}

fn update_paper(
    conn: &Connection,
    id: &Uuid,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(sql, params)?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "SourcePaper".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

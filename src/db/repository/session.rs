use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::SessionStatus;
use crate::models::{PracticeSession, ScoredResult, SessionResponse};

struct SessionRow {
    session_id: String,
    student_id: String,
    generated_id: String,
    started_at: String,
    duration_limit_secs: i64,
    status: String,
    finalized_at: Option<String>,
    result: Option<String>,
}

const SESSION_COLUMNS: &str = "session_id, student_id, generated_id, started_at,
     duration_limit_secs, status, finalized_at, result";

fn read_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        session_id: row.get(0)?,
        student_id: row.get(1)?,
        generated_id: row.get(2)?,
        started_at: row.get(3)?,
        duration_limit_secs: row.get(4)?,
        status: row.get(5)?,
        finalized_at: row.get(6)?,
        result: row.get(7)?,
    })
}

fn session_from_row(
    conn: &Connection,
    row: SessionRow,
) -> Result<PracticeSession, DatabaseError> {
    let session_id = parse_uuid(&row.session_id, "PracticeSession")?;
    let result: Option<ScoredResult> = match row.result {
        Some(raw) => Some(serde_json::from_str(&raw)?),
        None => None,
    };
    Ok(PracticeSession {
        session_id,
        student_id: row.student_id,
        generated_id: parse_uuid(&row.generated_id, "PracticeSession")?,
        started_at: parse_timestamp(&row.started_at),
        duration_limit_secs: row.duration_limit_secs,
        status: SessionStatus::from_str(&row.status)?,
        responses: get_responses(conn, &session_id)?,
        finalized_at: row.finalized_at.as_deref().map(parse_timestamp),
        result,
    })
}

pub fn insert_session(conn: &Connection, session: &PracticeSession) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO practice_sessions (session_id, student_id, generated_id, started_at,
         duration_limit_secs, status, finalized_at, result)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL)",
        params![
            session.session_id.to_string(),
            session.student_id,
            session.generated_id.to_string(),
            format_timestamp(&session.started_at),
            session.duration_limit_secs,
            session.status.as_str(),
        ],
    )?;
    Ok(())
}

pub fn get_session(conn: &Connection, id: &Uuid) -> Result<Option<PracticeSession>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM practice_sessions WHERE session_id = ?1"
    ))?;
    let result = stmt.query_row(params![id.to_string()], read_session_row);

    match result {
        Ok(row) => Ok(Some(session_from_row(conn, row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// RUNNING sessions of one student on one generated paper (expired or not).
pub fn find_running_sessions(
    conn: &Connection,
    student_id: &str,
    generated_id: &Uuid,
) -> Result<Vec<PracticeSession>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM practice_sessions
         WHERE student_id = ?1 AND generated_id = ?2 AND status = 'RUNNING'"
    ))?;
    let rows = stmt.query_map(params![student_id, generated_id.to_string()], read_session_row)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(session_from_row(conn, row?)?);
    }
    Ok(sessions)
}

/// Terminal sessions of a student that carry a stored result, oldest first.
pub fn list_scored_sessions(
    conn: &Connection,
    student_id: &str,
) -> Result<Vec<PracticeSession>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM practice_sessions
         WHERE student_id = ?1 AND status != 'RUNNING' AND result IS NOT NULL
         ORDER BY started_at"
    ))?;
    let rows = stmt.query_map(params![student_id], read_session_row)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(session_from_row(conn, row?)?);
    }
    Ok(sessions)
}

/// Record or overwrite the answer to one question.
pub fn upsert_response(
    conn: &Connection,
    session_id: &Uuid,
    question_id: &Uuid,
    response: &SessionResponse,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO session_responses (session_id, question_id, answer, submitted_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (session_id, question_id) DO UPDATE SET answer = excluded.answer,
         submitted_at = excluded.submitted_at",
        params![
            session_id.to_string(),
            question_id.to_string(),
            response.answer,
            format_timestamp(&response.submitted_at),
        ],
    )?;
    Ok(())
}

fn get_responses(
    conn: &Connection,
    session_id: &Uuid,
) -> Result<BTreeMap<Uuid, SessionResponse>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT question_id, answer, submitted_at FROM session_responses WHERE session_id = ?1",
    )?;
    let rows = stmt.query_map(params![session_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut responses = BTreeMap::new();
    for row in rows {
        let (question_id, answer, submitted_at) = row?;
        responses.insert(
            parse_uuid(&question_id, "SessionResponse")?,
            SessionResponse {
                answer,
                submitted_at: parse_timestamp(&submitted_at),
            },
        );
    }
    Ok(responses)
}

/// Move a RUNNING session into a terminal state. A terminal status never changes again.
pub fn close_session(
    conn: &Connection,
    id: &Uuid,
    status: SessionStatus,
    finalized_at: Option<&DateTime<Utc>>,
    result: Option<&ScoredResult>,
) -> Result<(), DatabaseError> {
    if !status.is_terminal() {
        return Err(DatabaseError::ConstraintViolation(format!(
            "cannot close session {id} into {status}"
        )));
    }
    let result_json = match result {
        Some(r) => Some(serde_json::to_string(r)?),
        None => None,
    };
    let rows = conn.execute(
        "UPDATE practice_sessions SET status = ?2, finalized_at = ?3, result = ?4
         WHERE session_id = ?1 AND status = 'RUNNING'",
        params![
            id.to_string(),
            status.as_str(),
            finalized_at.map(format_timestamp),
            result_json,
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "session {id} is not RUNNING"
        )));
    }
    Ok(())
}

/// Attach the scored result to a session that expired before it was finalized.
pub fn store_expired_result(
    conn: &Connection,
    id: &Uuid,
    finalized_at: &DateTime<Utc>,
    result: &ScoredResult,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE practice_sessions SET finalized_at = ?2, result = ?3
         WHERE session_id = ?1 AND status = 'EXPIRED' AND result IS NULL",
        params![
            id.to_string(),
            format_timestamp(finalized_at),
            serde_json::to_string(result)?,
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "session {id} is not an unscored EXPIRED session"
        )));
    }
    Ok(())
}

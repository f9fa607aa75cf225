//! Session lifecycle: start, answer, finalize.
//!
//! Every call takes `now` explicitly and re-derives expiry from the persisted
//! start time, so a restarted server enforces the same deadlines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::scoring::score_session;
use super::SessionError;
use crate::db::repository::{
    close_session, find_running_sessions, get_generated, get_questions, get_session,
    insert_session, store_expired_result, upsert_response,
};
use crate::db::DatabaseError;
use crate::models::enums::SessionStatus;
use crate::models::{PracticeSession, ScoredResult, SessionResponse};
use crate::pipeline_config::PracticeConfig;

fn load(conn: &Connection, session_id: &Uuid) -> Result<PracticeSession, SessionError> {
    get_session(conn, session_id)?
        .ok_or_else(|| SessionError::NotFound(format!("session {session_id}")))
}

/// Persist EXPIRED for a RUNNING session past its deadline. No scoring here.
fn mark_expired(conn: &Connection, session: &mut PracticeSession) -> Result<(), DatabaseError> {
    close_session(conn, &session.session_id, SessionStatus::Expired, None, None)?;
    session.status = SessionStatus::Expired;
    tracing::info!(session_id = %session.session_id, "Session expired");
    Ok(())
}

/// Load a session, persisting expiry if its deadline has passed.
pub fn refresh_session(
    conn: &Connection,
    session_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<PracticeSession, SessionError> {
    let mut session = load(conn, session_id)?;
    if session.status == SessionStatus::Running && session.is_expired_at(now) {
        mark_expired(conn, &mut session)?;
    }
    Ok(session)
}

pub fn start_session(
    conn: &Connection,
    student_id: &str,
    generated_id: &Uuid,
    duration_limit_secs: i64,
    config: &PracticeConfig,
    now: DateTime<Utc>,
) -> Result<PracticeSession, SessionError> {
    if student_id.trim().is_empty() {
        return Err(SessionError::InvalidRequest("student_id is required".into()));
    }
    if duration_limit_secs <= 0 || duration_limit_secs > config.max_duration_secs {
        return Err(SessionError::InvalidRequest(format!(
            "duration_limit must be between 1 and {} seconds",
            config.max_duration_secs
        )));
    }
    if get_generated(conn, generated_id)?.is_none() {
        return Err(SessionError::NotFound(format!("generated paper {generated_id}")));
    }

    let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
    for mut running in find_running_sessions(&tx, student_id, generated_id)? {
        if running.is_expired_at(now) {
            mark_expired(&tx, &mut running)?;
        } else {
            return Err(SessionError::AlreadyActive(running.session_id));
        }
    }

    let session = PracticeSession {
        session_id: Uuid::new_v4(),
        student_id: student_id.to_string(),
        generated_id: *generated_id,
        started_at: now,
        duration_limit_secs,
        status: SessionStatus::Running,
        responses: BTreeMap::new(),
        finalized_at: None,
        result: None,
    };
    insert_session(&tx, &session)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        session_id = %session.session_id,
        generated_id = %generated_id,
        duration_limit_secs,
        "Session started"
    );
    Ok(session)
}

pub fn submit_response(
    conn: &Connection,
    session_id: &Uuid,
    question_id: &Uuid,
    answer: &str,
    now: DateTime<Utc>,
) -> Result<PracticeSession, SessionError> {
    let mut session = refresh_session(conn, session_id, now)?;
    match session.status {
        SessionStatus::Running => {}
        SessionStatus::Expired => return Err(SessionError::Expired),
        SessionStatus::Submitted => return Err(SessionError::Closed),
    }

    let paper = get_generated(conn, &session.generated_id)?
        .ok_or_else(|| SessionError::NotFound(format!("generated paper {}", session.generated_id)))?;
    if !paper.questions.contains(question_id) {
        return Err(SessionError::UnknownQuestion(*question_id));
    }

    let response = SessionResponse {
        answer: answer.to_string(),
        submitted_at: now,
    };
    upsert_response(conn, session_id, question_id, &response)?;
    session.responses.insert(*question_id, response);
    Ok(session)
}

/// Score and close a session. Calling it again returns the stored result.
pub fn finalize_session(
    conn: &Connection,
    session_id: &Uuid,
    config: &PracticeConfig,
    now: DateTime<Utc>,
) -> Result<ScoredResult, SessionError> {
    let session = refresh_session(conn, session_id, now)?;
    if let Some(result) = session.result {
        return Ok(result);
    }

    let paper = get_generated(conn, &session.generated_id)?
        .ok_or_else(|| SessionError::NotFound(format!("generated paper {}", session.generated_id)))?;
    let questions = get_questions(conn, &paper.questions)?;

    let (status, cutoff) = match session.status {
        SessionStatus::Running => (SessionStatus::Submitted, None),
        _ => (SessionStatus::Expired, Some(session.deadline())),
    };
    let result = score_session(
        session.session_id,
        status,
        &paper,
        &questions,
        &session.responses,
        cutoff,
        config.weak_chapter_threshold,
    );

    match session.status {
        SessionStatus::Running => {
            close_session(conn, session_id, SessionStatus::Submitted, Some(&now), Some(&result))?
        }
        _ => store_expired_result(conn, session_id, &now, &result)?,
    }

    tracing::info!(
        session_id = %session_id,
        status = %status,
        score = result.total_score,
        max = result.max_score,
        "Session finalized"
    );
    Ok(result)
}

//! Timed practice sessions.
//!
//! Mutations on one session are serialized through its keyed lock; the
//! clock is read after the lock is held so ordering matches persistence.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::endpoints::run_blocking;
use crate::api::error::{parse_id, ApiError};
use crate::api::types::{ApiContext, SessionView};
use crate::models::ScoredResult;
use crate::pipeline::practice::{finalize_session, refresh_session, start_session, submit_response};

#[derive(Deserialize)]
pub struct StartRequest {
    pub student_id: String,
    pub generated_id: Uuid,
    /// Seconds.
    pub duration_limit: i64,
}

/// `POST /student/practice/sessions`
pub async fn start(
    State(ctx): State<ApiContext>,
    Json(body): Json<StartRequest>,
) -> Result<Json<SessionView>, ApiError> {
    // One-active-session check and insert must not interleave for the same student and paper.
    let _guard = ctx
        .core
        .session_locks
        .acquire(&format!("start:{}:{}", body.student_id, body.generated_id))
        .await?;

    let core = Arc::clone(&ctx.core);
    let session = run_blocking(move || {
        let conn = core.open_db()?;
        Ok(start_session(
            &conn,
            &body.student_id,
            &body.generated_id,
            body.duration_limit,
            &core.config.practice,
            Utc::now(),
        )?)
    })
    .await?;
    Ok(Json(SessionView::from(&session)))
}

/// `GET /student/practice/sessions/:session_id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session_id = parse_id(&session_id, "session")?;
    let _guard = ctx.core.session_locks.acquire(&session_id.to_string()).await?;

    let core = Arc::clone(&ctx.core);
    let session = run_blocking(move || {
        let conn = core.open_db()?;
        Ok(refresh_session(&conn, &session_id, Utc::now())?)
    })
    .await?;
    Ok(Json(SessionView::from(&session)))
}

#[derive(Deserialize)]
pub struct ResponseRequest {
    pub question_id: Uuid,
    pub answer: String,
}

/// `POST /student/practice/sessions/:session_id/responses`
pub async fn respond(
    State(ctx): State<ApiContext>,
    Path(session_id): Path<String>,
    Json(body): Json<ResponseRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session_id = parse_id(&session_id, "session")?;
    let _guard = ctx.core.session_locks.acquire(&session_id.to_string()).await?;

    let core = Arc::clone(&ctx.core);
    let session = run_blocking(move || {
        let conn = core.open_db()?;
        Ok(submit_response(
            &conn,
            &session_id,
            &body.question_id,
            &body.answer,
            Utc::now(),
        )?)
    })
    .await?;
    Ok(Json(SessionView::from(&session)))
}

/// `POST /student/practice/sessions/:session_id/finalize`
pub async fn finalize(
    State(ctx): State<ApiContext>,
    Path(session_id): Path<String>,
) -> Result<Json<ScoredResult>, ApiError> {
    let session_id = parse_id(&session_id, "session")?;
    let _guard = ctx.core.session_locks.acquire(&session_id.to_string()).await?;

    let core = Arc::clone(&ctx.core);
    let result = run_blocking(move || {
        let conn = core.open_db()?;
        Ok(finalize_session(
            &conn,
            &session_id,
            &core.config.practice,
            Utc::now(),
        )?)
    })
    .await?;
    Ok(Json(result))
}

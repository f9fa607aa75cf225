//! Health check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::endpoints::run_blocking;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::current_snapshot;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub snapshot_id: i64,
    pub ocr_available: bool,
}

/// `GET /health` — liveness plus the current bank snapshot.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    let core = Arc::clone(&ctx.core);
    let snapshot_id = run_blocking(move || {
        let conn = core.open_db()?;
        Ok(current_snapshot(&conn)?)
    })
    .await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        snapshot_id,
        ocr_available: ctx.core.extractor.has_ocr(),
    }))
}

//! Per-student performance across finalized sessions.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::api::endpoints::run_blocking;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::practice::{student_analytics, StudentAnalytics};

/// `GET /student/analytics/:student_id`
pub async fn student(
    State(ctx): State<ApiContext>,
    Path(student_id): Path<String>,
) -> Result<Json<StudentAnalytics>, ApiError> {
    let core = Arc::clone(&ctx.core);
    let report = run_blocking(move || {
        let conn = core.open_db()?;
        Ok(student_analytics(&conn, &student_id, &core.config.practice)?)
    })
    .await?;
    Ok(Json(report))
}

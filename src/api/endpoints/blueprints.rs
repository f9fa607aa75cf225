//! Inferred exam blueprints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::endpoints::run_blocking;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::Blueprint;
use crate::pipeline::blueprint::blueprint_for;

#[derive(Deserialize)]
pub struct PairQuery {
    pub exam_name: String,
    pub subject: String,
}

/// `GET /admin/blueprints?exam_name&subject` — blueprint of the current snapshot.
pub async fn current(
    State(ctx): State<ApiContext>,
    Query(query): Query<PairQuery>,
) -> Result<Json<Blueprint>, ApiError> {
    let core = Arc::clone(&ctx.core);
    let blueprint = run_blocking(move || {
        let conn = core.open_db()?;
        Ok(blueprint_for(
            &conn,
            &core.blueprints,
            &query.exam_name,
            &query.subject,
            &core.config.blueprint,
        )?)
    })
    .await?;
    Ok(Json(blueprint))
}

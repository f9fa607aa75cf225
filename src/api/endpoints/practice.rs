//! Practice papers for students: list, generate, view, print.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::api::endpoints::blueprints::PairQuery;
use crate::api::endpoints::run_blocking;
use crate::api::error::{parse_id, ApiError};
use crate::api::types::{ApiContext, PaperSummary, StudentPaperView};
use crate::db::repository::{get_generated, get_questions, list_generated};
use crate::export::render_paper_pdf;
use crate::models::enums::Difficulty;
use crate::models::GenerationConstraints;
use crate::pipeline::blueprint::blueprint_for;
use crate::pipeline::generator::generate_and_store;

/// `GET /student/practice/papers?exam_name&subject`
///
/// Papers already generated for the current snapshot; one is generated on
/// demand when there are none.
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(query): Query<PairQuery>,
) -> Result<Json<Vec<PaperSummary>>, ApiError> {
    // Concurrent first requests for a pair would otherwise each generate a paper.
    let _guard = ctx
        .core
        .paper_locks
        .acquire(&format!("generate:{}:{}", query.exam_name, query.subject))
        .await?;

    let core = Arc::clone(&ctx.core);
    let papers = run_blocking(move || {
        let conn = core.open_db()?;
        let blueprint = blueprint_for(
            &conn,
            &core.blueprints,
            &query.exam_name,
            &query.subject,
            &core.config.blueprint,
        )?;
        let existing = list_generated(&conn, &query.exam_name, &query.subject, blueprint.snapshot_id)?;
        if !existing.is_empty() {
            return Ok(existing);
        }
        let outcome = generate_and_store(&conn, &blueprint, &GenerationConstraints::default())?;
        Ok(vec![outcome.value])
    })
    .await?;

    Ok(Json(papers.iter().map(PaperSummary::from).collect()))
}

#[derive(Deserialize)]
pub struct GenerateRequest {
    pub exam_name: String,
    pub subject: String,
    #[serde(default)]
    pub chapters: Option<Vec<String>>,
    #[serde(default)]
    pub difficulty_mix: Option<BTreeMap<Difficulty, f64>>,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn validate_mix(mix: &BTreeMap<Difficulty, f64>) -> Result<(), ApiError> {
    if mix.values().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(ApiError::BadRequest("difficulty_mix values must be non-negative".into()));
    }
    if mix.values().sum::<f64>() <= 0.0 {
        return Err(ApiError::BadRequest("difficulty_mix must not be all zero".into()));
    }
    Ok(())
}

/// `POST /student/practice/papers` — generate with explicit constraints.
pub async fn generate(
    State(ctx): State<ApiContext>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<StudentPaperView>, ApiError> {
    if let Some(mix) = &body.difficulty_mix {
        validate_mix(mix)?;
    }
    if body.chapters.as_ref().is_some_and(|c| c.is_empty()) {
        return Err(ApiError::BadRequest("chapters must not be empty when given".into()));
    }
    let constraints = GenerationConstraints {
        chapters: body.chapters,
        difficulty_mix: body.difficulty_mix,
        seed: body.seed,
    };

    let core = Arc::clone(&ctx.core);
    let view = run_blocking(move || {
        let conn = core.open_db()?;
        let blueprint = blueprint_for(
            &conn,
            &core.blueprints,
            &body.exam_name,
            &body.subject,
            &core.config.blueprint,
        )?;
        let paper = generate_and_store(&conn, &blueprint, &constraints)?.value;
        let questions = get_questions(&conn, &paper.questions)?;
        Ok(StudentPaperView::build(&paper, &questions))
    })
    .await?;
    Ok(Json(view))
}

/// `GET /student/practice/papers/:generated_id` — student view, no answer keys.
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(generated_id): Path<String>,
) -> Result<Json<StudentPaperView>, ApiError> {
    let generated_id = parse_id(&generated_id, "generated paper")?;
    let core = Arc::clone(&ctx.core);
    let view = run_blocking(move || {
        let conn = core.open_db()?;
        let paper = get_generated(&conn, &generated_id)?
            .ok_or_else(|| ApiError::NotFound(format!("generated paper {generated_id}")))?;
        let questions = get_questions(&conn, &paper.questions)?;
        Ok(StudentPaperView::build(&paper, &questions))
    })
    .await?;
    Ok(Json(view))
}

#[derive(Deserialize, Default)]
pub struct PdfQuery {
    #[serde(default)]
    pub answer_key: bool,
}

/// `GET /student/practice/papers/:generated_id/pdf[?answer_key=true]`
pub async fn pdf(
    State(ctx): State<ApiContext>,
    Path(generated_id): Path<String>,
    Query(query): Query<PdfQuery>,
) -> Result<Response, ApiError> {
    let generated_id = parse_id(&generated_id, "generated paper")?;
    let core = Arc::clone(&ctx.core);
    let bytes = run_blocking(move || {
        let conn = core.open_db()?;
        let paper = get_generated(&conn, &generated_id)?
            .ok_or_else(|| ApiError::NotFound(format!("generated paper {generated_id}")))?;
        let questions = get_questions(&conn, &paper.questions)?;
        Ok(render_paper_pdf(&paper, &questions, query.answer_key)?)
    })
    .await?;

    let disposition = format!("inline; filename=\"practice-{generated_id}.pdf\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

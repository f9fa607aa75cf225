//! Chapter taxonomies used to tag questions at ingest time.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::api::endpoints::run_blocking;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::{get_taxonomy, upsert_taxonomy};
use crate::models::{ChapterEntry, ChapterTaxonomy, UNCLASSIFIED};

#[derive(Deserialize)]
pub struct TaxonomyRequest {
    pub chapters: Vec<ChapterEntry>,
}

fn validate(chapters: &[ChapterEntry]) -> Result<(), ApiError> {
    if chapters.is_empty() {
        return Err(ApiError::BadRequest("At least one chapter is required".into()));
    }
    let mut seen = std::collections::HashSet::new();
    for chapter in chapters {
        let tag = chapter.tag.trim();
        if tag.is_empty() || tag == UNCLASSIFIED {
            return Err(ApiError::BadRequest(format!("Invalid chapter tag: '{}'", chapter.tag)));
        }
        if !seen.insert(tag) {
            return Err(ApiError::BadRequest(format!("Duplicate chapter tag: {tag}")));
        }
        if chapter.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ApiError::BadRequest(format!("Chapter {tag} has no keywords")));
        }
    }
    Ok(())
}

/// `PUT /admin/taxonomies/:subject` — replaces the subject's chapter list.
///
/// Only later ingests use the new list; re-ingest a paper to re-tag it.
pub async fn put(
    State(ctx): State<ApiContext>,
    Path(subject): Path<String>,
    Json(body): Json<TaxonomyRequest>,
) -> Result<Json<ChapterTaxonomy>, ApiError> {
    validate(&body.chapters)?;
    let taxonomy = ChapterTaxonomy {
        subject: subject.trim().to_string(),
        chapters: body
            .chapters
            .into_iter()
            .map(|c| ChapterEntry {
                tag: c.tag.trim().to_string(),
                keywords: c
                    .keywords
                    .into_iter()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect(),
    };

    let core = Arc::clone(&ctx.core);
    let stored = taxonomy.clone();
    run_blocking(move || {
        let conn = core.open_db()?;
        upsert_taxonomy(&conn, &stored, &Utc::now())?;
        Ok(())
    })
    .await?;

    tracing::info!(subject = %taxonomy.subject, chapters = taxonomy.chapters.len(), "Taxonomy stored");
    Ok(Json(taxonomy))
}

/// `GET /admin/taxonomies/:subject`
pub async fn get(
    State(ctx): State<ApiContext>,
    Path(subject): Path<String>,
) -> Result<Json<ChapterTaxonomy>, ApiError> {
    let core = Arc::clone(&ctx.core);
    let lookup = subject.clone();
    run_blocking(move || {
        let conn = core.open_db()?;
        Ok(get_taxonomy(&conn, &lookup)?)
    })
    .await?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("taxonomy for {subject}")))
}

//! Past-paper administration: upload, ingest, inspect.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::run_blocking;
use crate::api::error::{parse_id, ApiError};
use crate::api::types::ApiContext;
use crate::db::repository::{get_paper, insert_paper, list_papers};
use crate::models::enums::PaperStatus;
use crate::models::SourcePaper;
use crate::pipeline::processor::{process_paper, IngestSummary, ProcessingError};

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

#[derive(Serialize)]
pub struct UploadResponse {
    pub paper_id: Uuid,
    pub status: PaperStatus,
    pub blob_ref: String,
}

#[derive(Default)]
struct UploadForm {
    exam_name: Option<String>,
    subject: Option<String>,
    year: Option<String>,
    file: Option<(Option<String>, Vec<u8>)>,
}

fn multipart_error(err: axum::extract::multipart::MultipartError, limit: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { limit }
    } else {
        ApiError::BadRequest(format!("Malformed multipart body: {err}"))
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("Missing field: {field}")))
}

fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes
        .windows(5)
        .take(1024)
        .any(|w| w == b"%PDF-")
}

/// `POST /admin/past-papers/upload` — multipart {exam_name, subject, year, file}.
pub async fn upload(
    State(ctx): State<ApiContext>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let limit = ctx.core.config.server.max_upload_bytes;
    let mut form = UploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_error(e, limit)),
        };
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "exam_name" | "subject" | "year" => {
                let text = field.text().await.map_err(|e| multipart_error(e, limit))?;
                match name.as_str() {
                    "exam_name" => form.exam_name = Some(text),
                    "subject" => form.subject = Some(text),
                    _ => form.year = Some(text),
                }
            }
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                if bytes.len() > limit {
                    return Err(ApiError::PayloadTooLarge { limit });
                }
                form.file = Some((filename, bytes.to_vec()));
            }
            other => tracing::debug!(field = other, "Ignoring unknown upload field"),
        }
    }

    let exam_name = required(form.exam_name, "exam_name")?;
    let subject = required(form.subject, "subject")?;
    let year: i32 = required(form.year, "year")?
        .parse()
        .map_err(|_| ApiError::BadRequest("year must be an integer".into()))?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(ApiError::BadRequest(format!(
            "year must be between {MIN_YEAR} and {MAX_YEAR}"
        )));
    }
    let (filename, bytes) = form
        .file
        .ok_or_else(|| ApiError::BadRequest("Missing field: file".into()))?;
    if bytes.is_empty() || !looks_like_pdf(&bytes) {
        return Err(ApiError::BadRequest("Uploaded file is not a PDF".into()));
    }

    let core = Arc::clone(&ctx.core);
    let paper = run_blocking(move || {
        let blob_ref = core.blobs.put(&bytes)?;
        let paper = SourcePaper::new_upload(&exam_name, &subject, year, blob_ref, filename, Utc::now());
        let conn = core.open_db()?;
        insert_paper(&conn, &paper)?;
        Ok(paper)
    })
    .await?;

    tracing::info!(
        paper_id = %paper.paper_id,
        exam = %paper.exam_name,
        subject = %paper.subject,
        year = paper.year,
        "Past paper uploaded"
    );
    Ok(Json(UploadResponse {
        paper_id: paper.paper_id,
        status: paper.status,
        blob_ref: paper.blob_ref,
    }))
}

#[derive(Deserialize, Default)]
pub struct IngestQuery {
    #[serde(default)]
    pub force: bool,
}

/// `POST /admin/past-papers/:paper_id/ingest[?force=true]` — synchronous ingest.
pub async fn ingest(
    State(ctx): State<ApiContext>,
    Path(paper_id): Path<String>,
    Query(query): Query<IngestQuery>,
) -> Result<Json<IngestSummary>, ApiError> {
    let paper_id = parse_id(&paper_id, "paper")?;
    let _guard = ctx.core.paper_locks.acquire(&paper_id.to_string()).await?;

    let core = Arc::clone(&ctx.core);
    let result = run_blocking(move || {
        let conn = core.open_db()?;
        Ok(process_paper(
            &conn,
            core.blobs.as_ref(),
            &core.extractor,
            &core.config.segmentation,
            &paper_id,
            query.force,
        ))
    })
    .await?;

    match result {
        Ok(summary) => {
            ctx.core
                .notify_bank_changed(&summary.exam_name, &summary.subject);
            Ok(Json(summary))
        }
        Err(ProcessingError::PaperNotFound(id)) => Err(ApiError::NotFound(format!("paper {id}"))),
        Err(e) if e.is_content_failure() => Err(ApiError::IngestFailed {
            paper_id,
            reason: e.to_string(),
        }),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

/// `GET /admin/past-papers/:paper_id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(paper_id): Path<String>,
) -> Result<Json<SourcePaper>, ApiError> {
    let paper_id = parse_id(&paper_id, "paper")?;
    let core = Arc::clone(&ctx.core);
    let paper = run_blocking(move || {
        let conn = core.open_db()?;
        Ok(get_paper(&conn, &paper_id)?)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("paper {paper_id}")))?;
    Ok(Json(paper))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub exam_name: String,
    pub subject: String,
    pub status: Option<String>,
}

/// `GET /admin/past-papers?exam_name&subject[&status]`
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SourcePaper>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<PaperStatus>()
                .map_err(|_| ApiError::BadRequest(format!("Unknown status: {s}")))
        })
        .transpose()?;
    let core = Arc::clone(&ctx.core);
    let papers = run_blocking(move || {
        let conn = core.open_db()?;
        Ok(list_papers(&conn, &query.exam_name, &query.subject, status)?)
    })
    .await?;
    Ok(Json(papers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_sniffing() {
        assert!(looks_like_pdf(b"%PDF-1.5\n..."));
        assert!(looks_like_pdf(b"\xef\xbb\xbf%PDF-1.4"));
        assert!(!looks_like_pdf(b"PK\x03\x04 zip"));
    }

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required(Some(" JEE ".into()), "exam_name").unwrap(), "JEE");
        assert!(required(Some("  ".into()), "exam_name").is_err());
        assert!(required(None, "exam_name").is_err());
    }
}

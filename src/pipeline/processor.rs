//! Paper ingestion driver.
//!
//! Single entry point that runs one ingestion attempt for an uploaded paper:
//! blob → extract → persist blocks → segment → commit questions. Any fatal
//! error leaves the paper FAILED with the reason recorded.
//!
//! Blocking; callers run it on the blocking pool while holding the paper's lock.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::blob_store::DocumentStore;
use crate::db::repository::{
    begin_ingest_attempt, get_blocks, get_paper, mark_paper_extracted, mark_paper_failed,
    replace_blocks,
};
use crate::db::DatabaseError;
use crate::models::enums::PaperStatus;
use crate::models::{ExtractedBlock, SourcePaper};
use crate::pipeline::extraction::{ExtractError, PaperExtractor};
use crate::pipeline::ingest::{ingest, IngestError};
use crate::pipeline::outcome::{Degradation, Outcome};
use crate::pipeline_config::SegmentationConfig;

/// Errors that can occur while ingesting a paper.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Paper not found: {0}")]
    PaperNotFound(Uuid),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl ProcessingError {
    /// Whether the failure is the paper's fault rather than the server's.
    pub fn is_content_failure(&self) -> bool {
        match self {
            Self::Extraction(ExtractError::Blob(_)) => false,
            Self::Extraction(_) => true,
            Self::Ingest(IngestError::NoSegmentableContent) => true,
            _ => false,
        }
    }
}

/// Summary returned to the admin after a successful ingest.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub paper_id: Uuid,
    pub status: PaperStatus,
    pub question_count: usize,
    pub degraded: bool,
    pub failed_pages: Vec<u32>,
    pub version: i64,
    pub snapshot_id: i64,
    pub degradations: Vec<Degradation>,
    pub exam_name: String,
    pub subject: String,
}

/// Run one ingestion attempt.
///
/// Blocks from an earlier successful extraction are reused unless `force` is set.
pub fn process_paper(
    conn: &Connection,
    store: &dyn DocumentStore,
    extractor: &PaperExtractor,
    config: &SegmentationConfig,
    paper_id: &Uuid,
    force: bool,
) -> Result<IngestSummary, ProcessingError> {
    let paper = get_paper(conn, paper_id)?.ok_or(ProcessingError::PaperNotFound(*paper_id))?;

    match run_attempt(conn, store, extractor, config, &paper, force) {
        Ok(summary) => Ok(summary),
        Err(e) => {
            tracing::warn!(paper_id = %paper_id, error = %e, "Ingestion failed");
            if let Err(mark) = mark_paper_failed(conn, paper_id, &e.to_string(), &Utc::now()) {
                tracing::error!(paper_id = %paper_id, error = %mark, "Could not record failure");
            }
            Err(e)
        }
    }
}

fn run_attempt(
    conn: &Connection,
    store: &dyn DocumentStore,
    extractor: &PaperExtractor,
    config: &SegmentationConfig,
    paper: &SourcePaper,
    force: bool,
) -> Result<IngestSummary, ProcessingError> {
    let paper_id = &paper.paper_id;
    let reusable = !force
        && matches!(paper.status, PaperStatus::Extracted | PaperStatus::Ingested);
    let stored = if reusable { get_blocks(conn, paper_id)? } else { Vec::new() };

    let reused = !stored.is_empty();
    let version = begin_ingest_attempt(conn, paper_id, &Utc::now())?;

    let extracted: Outcome<Vec<ExtractedBlock>> = if !reused {
        let outcome = extractor.extract_blob(store, &paper.blob_ref, paper_id)?;
        replace_blocks(conn, paper_id, &outcome.value)?;
        outcome
    } else {
        tracing::debug!(paper_id = %paper_id, blocks = stored.len(), "Reusing extracted blocks");
        let mut degradations = Vec::new();
        if !paper.failed_pages.is_empty() {
            degradations.push(Degradation::FailedPages {
                pages: paper.failed_pages.clone(),
            });
        }
        Outcome::with_degradations(stored, degradations)
    };

    let failed_pages = failed_pages_of(&extracted.degradations);
    let degraded = extracted.is_degraded() || (reused && paper.degraded);
    mark_paper_extracted(conn, paper_id, degraded, &failed_pages, &Utc::now())?;

    let report = ingest(conn, paper_id, &extracted.value, config, &Utc::now())?;

    Ok(IngestSummary {
        paper_id: *paper_id,
        status: PaperStatus::Ingested,
        question_count: report.questions.len(),
        degraded,
        failed_pages,
        version,
        snapshot_id: report.snapshot_id,
        degradations: extracted.degradations,
        exam_name: paper.exam_name.clone(),
        subject: paper.subject.clone(),
    })
}

fn failed_pages_of(degradations: &[Degradation]) -> Vec<u32> {
    degradations
        .iter()
        .filter_map(|d| match d {
            Degradation::FailedPages { pages } => Some(pages.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::FsBlobStore;
    use crate::db::repository::{count_question_rows, insert_paper, list_live_questions_for_paper};
    use crate::db::sqlite::open_memory_database;
    use crate::pipeline::extraction::fixtures::{mixed_pdf, simple_pdf, FixtureLine};
    use crate::pipeline::extraction::MockOcrEngine;
    use crate::pipeline_config::ExtractionConfig;
    use std::sync::Arc;

    const PAPER: &[&str] = &[
        "1. A ray of light passes through a glass slab of refractive index 1.5. [2]",
        "(a) It bends toward normal (b) It bends away (c) It goes straight (d) It reflects",
        "2. A block of mass 2 kg slides on a frictionless incline of angle 30 degrees. [3]",
        "Find the acceleration of the block along the incline in metres per second.",
        "3. Define the principle of conservation of momentum with one example. [5]",
    ];

    struct Setup {
        _dir: tempfile::TempDir,
        conn: Connection,
        store: FsBlobStore,
    }

    fn setup() -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        Setup {
            _dir: dir,
            conn: open_memory_database().unwrap(),
            store,
        }
    }

    fn upload(s: &Setup, bytes: &[u8]) -> SourcePaper {
        let key = s.store.put(bytes).unwrap();
        let paper = SourcePaper::new_upload("JEE", "Physics", 2021, key, None, Utc::now());
        insert_paper(&s.conn, &paper).unwrap();
        paper
    }

    fn extractor() -> PaperExtractor {
        PaperExtractor::from_config(&ExtractionConfig::default())
    }

    #[test]
    fn ingests_text_layer_paper() {
        let s = setup();
        let paper = upload(&s, &simple_pdf(&[PAPER]));

        let summary = process_paper(
            &s.conn,
            &s.store,
            &extractor(),
            &SegmentationConfig::default(),
            &paper.paper_id,
            false,
        )
        .unwrap();

        assert_eq!(summary.question_count, 3);
        assert_eq!(summary.version, 1);
        assert!(!summary.degraded);
        let stored = get_paper(&s.conn, &paper.paper_id).unwrap().unwrap();
        assert_eq!(stored.status, PaperStatus::Ingested);
    }

    #[test]
    fn reingest_is_idempotent_on_live_set() {
        let s = setup();
        let paper = upload(&s, &simple_pdf(&[PAPER]));
        let config = SegmentationConfig::default();

        process_paper(&s.conn, &s.store, &extractor(), &config, &paper.paper_id, false).unwrap();
        let first = list_live_questions_for_paper(&s.conn, &paper.paper_id).unwrap();
        let second_run =
            process_paper(&s.conn, &s.store, &extractor(), &config, &paper.paper_id, true).unwrap();
        let second = list_live_questions_for_paper(&s.conn, &paper.paper_id).unwrap();

        assert_eq!(second_run.version, 2);
        let ids = |qs: &[crate::models::QuestionRecord]| {
            qs.iter().map(|q| (q.question_id, q.prompt_text.clone())).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        // Old rows are tombstoned, not removed.
        assert_eq!(count_question_rows(&s.conn, &paper.paper_id).unwrap(), 6);
    }

    #[test]
    fn non_pdf_marks_paper_failed() {
        let s = setup();
        let paper = upload(&s, b"plain text, not a pdf");

        let err = process_paper(
            &s.conn,
            &s.store,
            &extractor(),
            &SegmentationConfig::default(),
            &paper.paper_id,
            false,
        )
        .unwrap_err();

        assert!(err.is_content_failure());
        let stored = get_paper(&s.conn, &paper.paper_id).unwrap().unwrap();
        assert_eq!(stored.status, PaperStatus::Failed);
        assert!(stored.failure_reason.unwrap().contains("PDF"));
    }

    #[test]
    fn unreadable_scan_page_degrades_but_ingests() {
        let s = setup();
        let text_page: Vec<FixtureLine> = PAPER
            .iter()
            .enumerate()
            .map(|(i, line)| FixtureLine::new(72.0, 740.0 - 16.0 * i as f32, line))
            .collect();
        let pdf = mixed_pdf(1, &[text_page.clone(), text_page.clone(), text_page]);
        let paper = upload(&s, &pdf);
        let failing = extractor().with_ocr(Arc::new(MockOcrEngine::failing()));

        let summary = process_paper(
            &s.conn,
            &s.store,
            &failing,
            &SegmentationConfig::default(),
            &paper.paper_id,
            false,
        )
        .unwrap();

        assert!(summary.degraded);
        assert_eq!(summary.failed_pages, vec![1]);
        assert!(summary.question_count >= 3);
    }

    #[test]
    fn scanned_cover_and_text_questions_ingest_together() {
        let s = setup();
        let questions: Vec<FixtureLine> = [
            "1. Define the moment of a force about a point. [2]",
            "2. State and explain Newton's second law of motion. [3]",
            "3. Derive the equation of motion for uniform acceleration. [5]",
        ]
        .iter()
        .enumerate()
        .map(|(i, line)| FixtureLine::new(72.0, 740.0 - 16.0 * i as f32, line))
        .collect();
        let pdf = mixed_pdf(1, &[questions]);
        let paper = upload(&s, &pdf);
        let ocr = extractor().with_ocr(Arc::new(MockOcrEngine::new(
            "General Instructions\nAll questions are compulsory\nUse blue ink only",
            0.95,
        )));

        let summary = process_paper(
            &s.conn,
            &s.store,
            &ocr,
            &SegmentationConfig::default(),
            &paper.paper_id,
            false,
        )
        .unwrap();

        assert_eq!(summary.status, PaperStatus::Ingested);
        assert!(summary.failed_pages.is_empty());
        let mut marks: Vec<u32> = list_live_questions_for_paper(&s.conn, &paper.paper_id)
            .unwrap()
            .iter()
            .map(|q| q.marks)
            .collect();
        marks.sort_unstable();
        assert_eq!(marks, vec![2, 3, 5]);
    }

    #[test]
    fn unknown_paper() {
        let s = setup();
        let err = process_paper(
            &s.conn,
            &s.store,
            &extractor(),
            &SegmentationConfig::default(),
            &Uuid::new_v4(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ProcessingError::PaperNotFound(_)));
    }
}

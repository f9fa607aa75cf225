//! Question-bank ingestion: blocks in, atomic question records out.

pub mod classify;
pub mod fields;
pub mod segment;

pub use classify::classify_chapter;
pub use fields::{read_fields, UnitFields};
pub use segment::{segment_blocks, QuestionUnit, Segmentation};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::{
    bump_snapshot, get_paper, get_taxonomy, mark_paper_ingested, replace_live_questions,
};
use crate::db::DatabaseError;
use crate::models::{question_id_for, ChapterTaxonomy, ExtractedBlock, QuestionRecord, SourcePaper};
use crate::pipeline_config::SegmentationConfig;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No question could be segmented from the extracted text")]
    NoSegmentableContent,

    #[error("Paper not found: {0}")]
    PaperNotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result of a committed ingest.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub questions: Vec<QuestionRecord>,
    pub tombstoned: usize,
    pub snapshot_id: i64,
}

/// Build question records for a paper without touching storage.
pub fn build_questions(
    paper: &SourcePaper,
    blocks: &[ExtractedBlock],
    taxonomy: Option<&ChapterTaxonomy>,
    config: &SegmentationConfig,
) -> Result<Vec<QuestionRecord>, IngestError> {
    let segmentation = segment_blocks(blocks, config.margin_tolerance_pt);
    if segmentation.units.is_empty() {
        return Err(IngestError::NoSegmentableContent);
    }

    let records = segmentation
        .units
        .iter()
        .enumerate()
        .map(|(i, unit)| {
            let key_answer = segmentation.answer_key.get(&unit.number).map(String::as_str);
            let fields = read_fields(unit, key_answer, config);
            let match_text = format!("{} {}", fields.prompt_text, fields.options.join(" "));
            QuestionRecord {
                question_id: question_id_for(
                    &paper.paper_id,
                    unit.first_order_index,
                    &unit_content(unit, key_answer),
                ),
                paper_id: paper.paper_id,
                exam_name: paper.exam_name.clone(),
                subject: paper.subject.clone(),
                year: paper.year,
                position: i as u32 + 1,
                chapter_tag: classify_chapter(&match_text, taxonomy),
                marks: fields.marks,
                question_type: fields.question_type,
                prompt_text: fields.prompt_text,
                options: fields.options,
                answer_key: fields.answer_key,
                difficulty: fields.difficulty,
                revision: paper.version,
            }
        })
        .collect();
    Ok(records)
}

/// Text a question id is derived from: the unit's lines plus its answer-key entry.
fn unit_content(unit: &QuestionUnit, key_answer: Option<&str>) -> String {
    format!("{}\u{1f}{}", unit.lines.join("\n"), key_answer.unwrap_or(""))
}

/// Segment `blocks` into questions and commit them as the paper's live set.
///
/// Tombstoning the previous rows, appending the new ones, bumping the bank
/// snapshot and marking the paper INGESTED happen in one transaction.
pub fn ingest(
    conn: &Connection,
    paper_id: &Uuid,
    blocks: &[ExtractedBlock],
    config: &SegmentationConfig,
    now: &DateTime<Utc>,
) -> Result<IngestReport, IngestError> {
    let paper = get_paper(conn, paper_id)?.ok_or(IngestError::PaperNotFound(*paper_id))?;
    let taxonomy = get_taxonomy(conn, &paper.subject)?;
    let questions = build_questions(&paper, blocks, taxonomy.as_ref(), config)?;

    let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
    let tombstoned = replace_live_questions(&tx, paper_id, &questions, now)?;
    let snapshot_id = bump_snapshot(&tx)?;
    mark_paper_ingested(&tx, paper_id, now)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        paper_id = %paper_id,
        questions = questions.len(),
        tombstoned,
        snapshot_id,
        "Paper ingested"
    );

    Ok(IngestReport {
        questions,
        tombstoned,
        snapshot_id,
    })
}

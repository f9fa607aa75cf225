use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{format_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::{Difficulty, QuestionType};
use crate::models::QuestionRecord;

const QUESTION_COLUMNS: &str = "q.question_id, q.paper_id, q.exam_name, q.subject, q.year,
     q.position, q.chapter_tag, q.marks, q.question_type, q.prompt_text, q.options,
     q.answer_key, q.difficulty, q.revision";

struct QuestionRow {
    question_id: String,
    paper_id: String,
    exam_name: String,
    subject: String,
    year: i32,
    position: u32,
    chapter_tag: String,
    marks: u32,
    question_type: String,
    prompt_text: String,
    options: String,
    answer_key: Option<String>,
    difficulty: String,
    revision: i64,
}

fn read_question_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QuestionRow> {
    Ok(QuestionRow {
        question_id: row.get(0)?,
        paper_id: row.get(1)?,
        exam_name: row.get(2)?,
        subject: row.get(3)?,
        year: row.get(4)?,
        position: row.get(5)?,
        chapter_tag: row.get(6)?,
        marks: row.get(7)?,
        question_type: row.get(8)?,
        prompt_text: row.get(9)?,
        options: row.get(10)?,
        answer_key: row.get(11)?,
        difficulty: row.get(12)?,
        revision: row.get(13)?,
    })
}

fn question_from_row(row: QuestionRow) -> Result<QuestionRecord, DatabaseError> {
    Ok(QuestionRecord {
        question_id: parse_uuid(&row.question_id, "QuestionRecord")?,
        paper_id: parse_uuid(&row.paper_id, "QuestionRecord")?,
        exam_name: row.exam_name,
        subject: row.subject,
        year: row.year,
        position: row.position,
        chapter_tag: row.chapter_tag,
        marks: row.marks,
        question_type: QuestionType::from_str(&row.question_type)?,
        prompt_text: row.prompt_text,
        options: serde_json::from_str(&row.options)?,
        answer_key: row.answer_key,
        difficulty: Difficulty::from_str(&row.difficulty)?,
        revision: row.revision,
    })
}

fn collect_questions(
    stmt: &mut rusqlite::Statement<'_>,
    params: impl rusqlite::Params,
) -> Result<Vec<QuestionRecord>, DatabaseError> {
    let rows = stmt.query_map(params, read_question_row)?;
    let mut questions = Vec::new();
    for row in rows {
        questions.push(question_from_row(row?)?);
    }
    Ok(questions)
}

/// Tombstone the paper's live rows and append the new set.
///
/// Must run inside the caller's transaction so readers never observe a paper
/// with zero live questions. Returns how many rows were tombstoned.
pub fn replace_live_questions(
    conn: &Connection,
    paper_id: &Uuid,
    questions: &[QuestionRecord],
    now: &DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let tombstoned = conn.execute(
        "UPDATE questions SET tombstoned = 1 WHERE paper_id = ?1 AND tombstoned = 0",
        params![paper_id.to_string()],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO questions (question_id, revision, paper_id, exam_name, subject, year,
         position, chapter_tag, marks, question_type, prompt_text, options, answer_key,
         difficulty, tombstoned, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 0, ?15)",
    )?;
    for q in questions {
        if q.paper_id != *paper_id {
            return Err(DatabaseError::ConstraintViolation(format!(
                "question {} belongs to paper {}, not {paper_id}",
                q.question_id, q.paper_id
            )));
        }
        stmt.execute(params![
            q.question_id.to_string(),
            q.revision,
            q.paper_id.to_string(),
            q.exam_name,
            q.subject,
            q.year,
            q.position,
            q.chapter_tag,
            q.marks,
            q.question_type.as_str(),
            q.prompt_text,
            serde_json::to_string(&q.options)?,
            q.answer_key,
            q.difficulty.as_str(),
            format_timestamp(now),
        ])?;
    }
    Ok(tombstoned)
}

/// Live questions of one paper in paper order.
pub fn list_live_questions_for_paper(
    conn: &Connection,
    paper_id: &Uuid,
) -> Result<Vec<QuestionRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions q
         WHERE q.paper_id = ?1 AND q.tombstoned = 0 ORDER BY q.position"
    ))?;
    collect_questions(&mut stmt, params![paper_id.to_string()])
}

/// Live questions from INGESTED papers of an exam/subject, ordered by year,
/// paper, then position.
pub fn list_live_questions(
    conn: &Connection,
    exam_name: &str,
    subject: &str,
) -> Result<Vec<QuestionRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions q
         JOIN source_papers p ON p.paper_id = q.paper_id
         WHERE q.exam_name = ?1 AND q.subject = ?2 AND q.tombstoned = 0
           AND p.status = 'INGESTED'
         ORDER BY q.year, q.paper_id, q.position"
    ))?;
    collect_questions(&mut stmt, params![exam_name, subject])
}

/// Latest revision of each requested question, live or not.
///
/// Generated papers keep referring to a question after its paper is re-ingested.
pub fn get_questions(
    conn: &Connection,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, QuestionRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions q
         WHERE q.question_id = ?1 ORDER BY q.revision DESC LIMIT 1"
    ))?;

    let mut found = HashMap::with_capacity(ids.len());
    for id in ids {
        let result = stmt.query_row(params![id.to_string()], read_question_row);
        match result {
            Ok(row) => {
                found.insert(*id, question_from_row(row)?);
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(found)
}

/// Count of every row ever written for a paper, tombstoned included.
pub fn count_question_rows(conn: &Connection, paper_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM questions WHERE paper_id = ?1",
        params![paper_id.to_string()],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

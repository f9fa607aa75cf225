use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Serialize;

use super::scoring::{accuracy, weak_chapters};
use crate::db::repository::list_scored_sessions;
use crate::db::DatabaseError;
use crate::models::{ChapterScore, ScoredResult};
use crate::pipeline_config::PracticeConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAnalytics {
    pub student_id: String,
    pub tests_attempted: usize,
    /// Mean of per-session percentages, 0 when nothing was attempted.
    pub average_percentage: f64,
    pub per_chapter: BTreeMap<String, ChapterScore>,
    pub weak_chapters: Vec<String>,
}

/// Fold finalized results into one report. Chapter accuracy pools question counts across sessions.
pub fn aggregate(student_id: &str, results: &[ScoredResult], weak_threshold: f64) -> StudentAnalytics {
    let mut per_chapter: BTreeMap<String, ChapterScore> = BTreeMap::new();
    for result in results {
        for (tag, score) in &result.per_chapter {
            let entry = per_chapter.entry(tag.clone()).or_default();
            entry.correct += score.correct;
            entry.total += score.total;
        }
    }
    for score in per_chapter.values_mut() {
        score.accuracy = accuracy(score.correct, score.total);
    }

    let average_percentage = if results.is_empty() {
        0.0
    } else {
        results.iter().map(ScoredResult::percentage).sum::<f64>() / results.len() as f64
    };

    StudentAnalytics {
        student_id: student_id.to_string(),
        tests_attempted: results.len(),
        average_percentage,
        weak_chapters: weak_chapters(&per_chapter, weak_threshold),
        per_chapter,
    }
}

pub fn student_analytics(
    conn: &Connection,
    student_id: &str,
    config: &PracticeConfig,
) -> Result<StudentAnalytics, DatabaseError> {
    let results: Vec<ScoredResult> = list_scored_sessions(conn, student_id)?
        .into_iter()
        .filter_map(|s| s.result)
        .collect();
    Ok(aggregate(student_id, &results, config.weak_chapter_threshold))
}

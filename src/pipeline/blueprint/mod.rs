//! Blueprint inference, memoized by bank snapshot.

pub mod analyzer;
pub mod recompute;

pub use analyzer::{analyze_questions, section_name};
pub use recompute::{spawn_recompute_worker, RecomputeHandle};

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use thiserror::Error;

use crate::db::repository::{current_snapshot, get_blueprint, list_live_questions, save_blueprint};
use crate::db::DatabaseError;
use crate::models::Blueprint;
use crate::pipeline_config::BlueprintConfig;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Need papers from at least 2 distinct years, have {years}")]
    InsufficientHistory { years: usize },

    #[error("No section recurs across a majority of years")]
    NoRecurringStructure,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// In-memory blueprint cache. Entries from older snapshots are treated as misses.
#[derive(Default)]
pub struct BlueprintCache {
    entries: Mutex<HashMap<(String, String), Blueprint>>,
}

impl BlueprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, exam_name: &str, subject: &str, snapshot_id: i64) -> Option<Blueprint> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(&(exam_name.to_string(), subject.to_string()))
            .filter(|bp| bp.snapshot_id == snapshot_id)
            .cloned()
    }

    pub fn put(&self, blueprint: Blueprint) {
        if let Ok(mut entries) = self.entries.lock() {
            let key = (blueprint.exam_name.clone(), blueprint.subject.clone());
            // Never replace a newer snapshot with an older one.
            if entries
                .get(&key)
                .map_or(true, |existing| existing.snapshot_id <= blueprint.snapshot_id)
            {
                entries.insert(key, blueprint);
            }
        }
    }
}

/// Blueprint for the current snapshot: memory, then database, then a fresh analysis.
pub fn blueprint_for(
    conn: &Connection,
    cache: &BlueprintCache,
    exam_name: &str,
    subject: &str,
    config: &BlueprintConfig,
) -> Result<Blueprint, AnalyzeError> {
    let snapshot_id = current_snapshot(conn)?;
    if let Some(bp) = cache.get(exam_name, subject, snapshot_id) {
        return Ok(bp);
    }
    if let Some(bp) = get_blueprint(conn, exam_name, subject, snapshot_id)? {
        cache.put(bp.clone());
        return Ok(bp);
    }

    let questions = list_live_questions(conn, exam_name, subject)?;
    let blueprint =
        analyze_questions(exam_name, subject, snapshot_id, &questions, config, Utc::now())?;
    save_blueprint(conn, &blueprint)?;
    cache.put(blueprint.clone());

    tracing::info!(
        exam = exam_name,
        subject,
        snapshot_id,
        sections = blueprint.sections.len(),
        "Blueprint computed"
    );
    Ok(blueprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{bump_snapshot, insert_paper, mark_paper_ingested, replace_live_questions};
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::QuestionType;
    use crate::models::SourcePaper;
    use analyzer::tests::paper;

    fn ingest_year(conn: &Connection, year: i32) {
        let mut questions = paper(year, &[(QuestionType::Mcq, 1, "Optics"), (QuestionType::Long, 5, "Optics")]);
        let record = SourcePaper::new_upload("JEE", "Physics", year, "k".into(), None, Utc::now());
        for q in &mut questions {
            q.paper_id = record.paper_id;
        }
        insert_paper(conn, &record).unwrap();
        replace_live_questions(conn, &record.paper_id, &questions, &Utc::now()).unwrap();
        mark_paper_ingested(conn, &record.paper_id, &Utc::now()).unwrap();
        bump_snapshot(conn).unwrap();
    }

    #[test]
    fn insufficient_then_available_after_second_year() {
        let conn = open_memory_database().unwrap();
        let cache = BlueprintCache::new();
        let config = BlueprintConfig::default();

        ingest_year(&conn, 2020);
        let err = blueprint_for(&conn, &cache, "JEE", "Physics", &config).unwrap_err();
        assert!(matches!(err, AnalyzeError::InsufficientHistory { years: 1 }));

        ingest_year(&conn, 2021);
        let bp = blueprint_for(&conn, &cache, "JEE", "Physics", &config).unwrap();
        assert_eq!(bp.snapshot_id, 2);
        assert_eq!(bp.sections.len(), 2);
    }

    #[test]
    fn memoized_per_snapshot() {
        let conn = open_memory_database().unwrap();
        let cache = BlueprintCache::new();
        let config = BlueprintConfig::default();
        ingest_year(&conn, 2020);
        ingest_year(&conn, 2021);

        let first = blueprint_for(&conn, &cache, "JEE", "Physics", &config).unwrap();
        let again = blueprint_for(&conn, &cache, "JEE", "Physics", &config).unwrap();
        assert_eq!(first.computed_at, again.computed_at);

        // A fresh cache still finds the persisted copy.
        let cold = blueprint_for(&conn, &BlueprintCache::new(), "JEE", "Physics", &config).unwrap();
        assert_eq!(cold.computed_at, first.computed_at);

        ingest_year(&conn, 2022);
        let next = blueprint_for(&conn, &cache, "JEE", "Physics", &config).unwrap();
        assert_eq!(next.snapshot_id, 3);
        assert_eq!(next.years, vec![2020, 2021, 2022]);
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{Difficulty, QuestionType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintSection {
    pub name: String,
    pub question_count: u32,
    pub marks_per_question: u32,
    pub allowed_types: Vec<QuestionType>,
    /// chapter_tag -> fraction; sums to 1.0.
    pub chapter_weight: BTreeMap<String, f64>,
}

/// Recurring structure of one exam/subject, inferred from its past papers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub exam_name: String,
    pub subject: String,
    pub snapshot_id: i64,
    pub years: Vec<i32>,
    pub paper_count: usize,
    pub sections: Vec<BlueprintSection>,
    pub total_marks: u32,
    /// Observed share of each difficulty across the contributing questions.
    pub difficulty_mix: BTreeMap<Difficulty, f64>,
    pub computed_at: DateTime<Utc>,
}

impl Blueprint {
    pub fn question_count(&self) -> u32 {
        self.sections.iter().map(|s| s.question_count).sum()
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Difficulty;
use crate::pipeline::outcome::Degradation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub name: String,
    pub marks_per_question: u32,
    pub requested: u32,
    pub question_ids: Vec<Uuid>,
}

/// A synthesized practice paper. `questions` is the flat ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPaper {
    pub generated_id: Uuid,
    pub exam_name: String,
    pub subject: String,
    pub snapshot_id: i64,
    pub seed: u64,
    pub generated_at: DateTime<Utc>,
    pub questions: Vec<Uuid>,
    pub sections: Vec<GeneratedSection>,
    pub total_marks: u32,
    pub degraded: bool,
    pub degradations: Vec<Degradation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConstraints {
    /// Restrict picks to these chapters; weights are renormalized over them.
    #[serde(default)]
    pub chapters: Option<Vec<String>>,
    /// Preferred difficulty shares. Treated as a preference, never a hard filter.
    #[serde(default)]
    pub difficulty_mix: Option<BTreeMap<Difficulty, f64>>,
    #[serde(default)]
    pub seed: Option<u64>,
}

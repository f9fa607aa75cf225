use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::SessionStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResponse {
    pub answer: String,
    pub submitted_at: DateTime<Utc>,
}

/// A timed attempt of one generated paper by one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeSession {
    pub session_id: Uuid,
    pub student_id: String,
    pub generated_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_limit_secs: i64,
    pub status: SessionStatus,
    pub responses: BTreeMap<Uuid, SessionResponse>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub result: Option<ScoredResult>,
}

impl PracticeSession {
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + Duration::seconds(self.duration_limit_secs)
    }

    /// Expiry is derived from the persisted start time, never from a timer.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionScore {
    pub question_id: Uuid,
    pub chapter_tag: String,
    pub marks: u32,
    pub submitted: Option<String>,
    /// `None` when the question has no answer key.
    pub correct: Option<bool>,
    pub awarded: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChapterScore {
    pub correct: u32,
    pub total: u32,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub total_score: u32,
    pub max_score: u32,
    pub answered: u32,
    pub per_question: Vec<QuestionScore>,
    pub per_chapter: BTreeMap<String, ChapterScore>,
    pub weak_chapters: Vec<String>,
}

impl ScoredResult {
    pub fn percentage(&self) -> f64 {
        if self.max_score == 0 {
            return 0.0;
        }
        self.total_score as f64 * 100.0 / self.max_score as f64
    }
}

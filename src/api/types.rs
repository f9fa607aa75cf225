//! Shared types for the HTTP layer: context and response views.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core_state::CoreState;
use crate::models::enums::{QuestionType, SessionStatus};
use crate::models::{GeneratedPaper, PracticeSession, QuestionRecord};
use crate::pipeline::outcome::Degradation;

/// Shared context for all routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// Listing entry for a generated paper.
#[derive(Debug, Serialize)]
pub struct PaperSummary {
    pub generated_id: Uuid,
    pub exam_name: String,
    pub subject: String,
    pub snapshot_id: i64,
    pub seed: u64,
    pub question_count: usize,
    pub total_marks: u32,
    pub degraded: bool,
    pub degradations: Vec<Degradation>,
    pub generated_at: DateTime<Utc>,
}

impl From<&GeneratedPaper> for PaperSummary {
    fn from(paper: &GeneratedPaper) -> Self {
        Self {
            generated_id: paper.generated_id,
            exam_name: paper.exam_name.clone(),
            subject: paper.subject.clone(),
            snapshot_id: paper.snapshot_id,
            seed: paper.seed,
            question_count: paper.questions.len(),
            total_marks: paper.total_marks,
            degraded: paper.degraded,
            degradations: paper.degradations.clone(),
            generated_at: paper.generated_at,
        }
    }
}

/// A question as a student sees it: no answer key, no provenance.
#[derive(Debug, Serialize)]
pub struct StudentQuestion {
    pub number: usize,
    pub question_id: Uuid,
    pub question_type: QuestionType,
    pub marks: u32,
    pub prompt_text: String,
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StudentSection {
    pub name: String,
    pub marks_per_question: u32,
    pub questions: Vec<StudentQuestion>,
}

#[derive(Debug, Serialize)]
pub struct StudentPaperView {
    #[serde(flatten)]
    pub summary: PaperSummary,
    pub sections: Vec<StudentSection>,
}

impl StudentPaperView {
    /// Questions missing from the bank are left out of the view.
    pub fn build(paper: &GeneratedPaper, questions: &HashMap<Uuid, QuestionRecord>) -> Self {
        let mut number = 0;
        let sections = paper
            .sections
            .iter()
            .map(|section| StudentSection {
                name: section.name.clone(),
                marks_per_question: section.marks_per_question,
                questions: section
                    .question_ids
                    .iter()
                    .filter_map(|id| questions.get(id))
                    .map(|q| {
                        number += 1;
                        StudentQuestion {
                            number,
                            question_id: q.question_id,
                            question_type: q.question_type,
                            marks: q.marks,
                            prompt_text: q.prompt_text.clone(),
                            options: q.options.clone(),
                        }
                    })
                    .collect(),
            })
            .collect();
        Self {
            summary: PaperSummary::from(paper),
            sections,
        }
    }
}

/// Session state returned by start/respond/get. Answers are echoed, scores are not.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub student_id: String,
    pub generated_id: Uuid,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub duration_limit_secs: i64,
    pub answered: usize,
    pub responses: HashMap<Uuid, String>,
}

impl From<&PracticeSession> for SessionView {
    fn from(session: &PracticeSession) -> Self {
        Self {
            session_id: session.session_id,
            student_id: session.student_id.clone(),
            generated_id: session.generated_id,
            status: session.status,
            started_at: session.started_at,
            deadline: session.deadline(),
            duration_limit_secs: session.duration_limit_secs,
            answered: session.responses.len(),
            responses: session
                .responses
                .iter()
                .map(|(id, r)| (*id, r.answer.clone()))
                .collect(),
        }
    }
}

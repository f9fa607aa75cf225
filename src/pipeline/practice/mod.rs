//! Timed practice sessions, scoring and per-student analytics.

pub mod analytics;
pub mod scoring;
pub mod session;

pub use analytics::{student_analytics, StudentAnalytics};
pub use scoring::{answers_match, score_session};
pub use session::{finalize_session, refresh_session, start_session, submit_response};

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Student already has a running session on this paper: {0}")]
    AlreadyActive(Uuid),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session time limit has passed")]
    Expired,

    #[error("Session already submitted")]
    Closed,

    #[error("Question {0} is not part of this paper")]
    UnknownQuestion(Uuid),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

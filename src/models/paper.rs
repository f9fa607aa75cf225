use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::PaperStatus;

/// One uploaded past paper. Rows are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePaper {
    pub paper_id: Uuid,
    pub exam_name: String,
    pub subject: String,
    pub year: i32,
    pub blob_ref: String,
    pub original_filename: Option<String>,
    pub status: PaperStatus,
    /// Bumped by every ingestion attempt.
    pub version: i64,
    pub degraded: bool,
    pub failure_reason: Option<String>,
    pub failed_pages: Vec<u32>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourcePaper {
    pub fn new_upload(
        exam_name: &str,
        subject: &str,
        year: i32,
        blob_ref: String,
        original_filename: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            paper_id: Uuid::new_v4(),
            exam_name: exam_name.to_string(),
            subject: subject.to_string(),
            year,
            blob_ref,
            original_filename,
            status: PaperStatus::Uploaded,
            version: 1,
            degraded: false,
            failure_reason: None,
            failed_pages: Vec::new(),
            uploaded_at: now,
            updated_at: now,
        }
    }
}

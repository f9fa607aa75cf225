use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::enums::{Difficulty, QuestionType};

/// Tag given to questions no taxonomy chapter matched.
pub const UNCLASSIFIED: &str = "UNCLASSIFIED";

/// Namespace for deterministic question ids.
pub const QUESTION_NAMESPACE: Uuid = Uuid::from_u128(0x5c1f_7a0e_93d2_4b8e_a1f0_6e2d_0c4b_9a17);

/// An atomic question as stored in the bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question_id: Uuid,
    pub paper_id: Uuid,
    pub exam_name: String,
    pub subject: String,
    pub year: i32,
    /// Ordinal of the question within its paper.
    pub position: u32,
    pub chapter_tag: String,
    pub marks: u32,
    pub question_type: QuestionType,
    pub prompt_text: String,
    pub options: Vec<String>,
    pub answer_key: Option<String>,
    pub difficulty: Difficulty,
    /// Paper version that produced this row.
    pub revision: i64,
}

impl QuestionRecord {
    pub fn is_classified(&self) -> bool {
        self.chapter_tag != UNCLASSIFIED
    }
}

/// Stable id over paper, first block and content.
///
/// Re-ingesting identical blocks gives the same id; any change to the
/// question's text or key yields a new one, so papers already generated keep
/// pointing at what they were built from.
pub fn question_id_for(paper_id: &Uuid, first_order_index: u32, content: &str) -> Uuid {
    let digest = Sha256::digest(content.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    Uuid::new_v5(
        &QUESTION_NAMESPACE,
        format!("{paper_id}:{first_order_index}:{hex}").as_bytes(),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub tag: String,
    pub keywords: Vec<String>,
}

/// Chapter list for one subject, supplied by an administrator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChapterTaxonomy {
    pub subject: String,
    pub chapters: Vec<ChapterEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_id_is_deterministic() {
        let paper = Uuid::new_v4();
        let id = question_id_for(&paper, 4, "Define work.");
        assert_eq!(id, question_id_for(&paper, 4, "Define work."));
        assert_ne!(id, question_id_for(&paper, 5, "Define work."));
        assert_ne!(id, question_id_for(&Uuid::new_v4(), 4, "Define work."));
    }

    #[test]
    fn changed_content_gets_new_id() {
        let paper = Uuid::new_v4();
        assert_ne!(
            question_id_for(&paper, 4, "Define work.\u{1f}b"),
            question_id_for(&paper, 4, "Define power.\u{1f}b")
        );
        assert_ne!(
            question_id_for(&paper, 4, "Define work.\u{1f}b"),
            question_id_for(&paper, 4, "Define work.\u{1f}c")
        );
    }
}

//! Non-fatal quality compromises carried alongside a stage's result.

use serde::{Deserialize, Serialize};

use crate::models::enums::Difficulty;

/// A recorded shortfall. Never an error; always surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Pages neither the text layer nor OCR could read.
    FailedPages { pages: Vec<u32> },
    /// OCR pages below the confidence threshold.
    LowConfidencePages { pages: Vec<u32> },
    /// A slot took a question from another chapter.
    ChapterSubstituted {
        section: String,
        wanted: String,
        used: String,
    },
    /// No candidate with the section's marks and types remained at all.
    SlotUnfilled { section: String, chapter: String },
    /// The requested difficulty share could not be met.
    DifficultyShortfall { difficulty: Difficulty, missing: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub degradations: Vec<Degradation>,
}

impl<T> Outcome<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            degradations: Vec::new(),
        }
    }

    pub fn with_degradations(value: T, degradations: Vec<Degradation>) -> Self {
        Self {
            value,
            degradations,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            degradations: self.degradations,
        }
    }
}

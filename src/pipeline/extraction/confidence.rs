use crate::models::enums::BlockSource;
use crate::models::ExtractedBlock;

/// Confidence thresholds used by the pipeline
pub mod thresholds {
    /// Below this: the page is effectively unreadable.
    pub const VERY_LOW: f32 = 0.30;

    /// Below this: OCR output is flagged and the paper marked degraded.
    pub const LOW: f32 = 0.50;

    /// Text-layer extraction.
    pub const NATIVE: f32 = 1.0;
}

/// Paper-level confidence: block confidences weighted by text length.
/// Placeholder blocks of failed pages count as one character at zero.
pub fn overall_confidence(blocks: &[ExtractedBlock]) -> f32 {
    let mut weighted = 0.0f32;
    let mut total = 0usize;
    for block in blocks {
        let weight = match block.source {
            BlockSource::Failed => 1,
            _ => block.text.chars().count().max(1),
        };
        weighted += block.confidence * weight as f32;
        total += weight;
    }
    if total == 0 {
        return 0.0;
    }
    weighted / total as f32
}

/// Clamp a recognizer score into [0, 1]; engines reporting 0-100 are rescaled.
pub fn normalize_confidence(raw: f32) -> f32 {
    if !raw.is_finite() {
        return 0.0;
    }
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    scaled.clamp(0.0, 1.0)
}

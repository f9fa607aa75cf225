use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::BlockSource;

/// Region of a page in PDF points, `y` measured down from the top edge.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A line of text in reading order. `order_index` is global across the paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedBlock {
    pub paper_id: Uuid,
    pub page_no: u32,
    pub order_index: u32,
    pub text: String,
    pub region: BoundingRegion,
    pub confidence: f32,
    pub source: BlockSource,
}

use serde::{Deserialize, Serialize};

use super::ExtractError;

/// One US-Letter page (612 x 792 pt). Character density is counted per this area.
pub const AREA_UNIT_PT2: f32 = 612.0 * 792.0;

/// A line of native text with its position, `top` measured from the top edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedLine {
    pub text: String,
    pub x: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Native text layer of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based.
    pub page_no: u32,
    pub width: f32,
    pub height: f32,
    pub lines: Vec<PositionedLine>,
}

impl PageText {
    /// Non-whitespace characters in the text layer.
    pub fn char_count(&self) -> usize {
        self.lines
            .iter()
            .map(|l| l.text.chars().filter(|c| !c.is_whitespace()).count())
            .sum()
    }

    /// Characters per area unit.
    pub fn density(&self) -> f32 {
        let area = (self.width * self.height).max(1.0);
        self.char_count() as f32 / (area / AREA_UNIT_PT2)
    }
}

/// Raw OCR result from the engine
#[derive(Debug, Clone, PartialEq)]
pub struct OcrPageResult {
    pub text: String,
    pub confidence: f32,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractError>;
}

/// PDF text-layer extraction abstraction
pub trait PdfTextLayer {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<PageText>, ExtractError>;
}

/// Produces an OCR-ready image (PNG) of one page. `page_index` is 0-based.
pub trait PdfPageRenderer {
    fn render_page(&self, pdf_bytes: &[u8], page_index: usize) -> Result<Vec<u8>, ExtractError>;
}
